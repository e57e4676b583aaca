use std::sync::atomic::{AtomicU64, Ordering};

use tessera_types::ObjectId;

/// Per-item notifications from bulk reads and writes.
///
/// Callbacks run on the thread driving the bulk operation, once per item and
/// in iteration order. Every method defaults to a no-op.
pub trait BulkOpListener: Send + Sync {
    /// An object was read. `size` is its canonical encoded length.
    fn found(&self, _id: &ObjectId, _size: usize) {}

    /// An object was written. `size` is its canonical encoded length.
    fn inserted(&self, _id: &ObjectId, _size: usize) {}

    /// An object offered for writing was already present.
    fn already_exists(&self, _id: &ObjectId) {}

    /// A requested object does not exist.
    fn not_found(&self, _id: &ObjectId) {}
}

/// Ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl BulkOpListener for NoopListener {}

/// Counts notifications by kind.
#[derive(Debug, Default)]
pub struct CountingListener {
    found: AtomicU64,
    inserted: AtomicU64,
    existing: AtomicU64,
    not_found: AtomicU64,
}

impl CountingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn found_count(&self) -> u64 {
        self.found.load(Ordering::Relaxed)
    }

    pub fn inserted_count(&self) -> u64 {
        self.inserted.load(Ordering::Relaxed)
    }

    pub fn existing_count(&self) -> u64 {
        self.existing.load(Ordering::Relaxed)
    }

    pub fn not_found_count(&self) -> u64 {
        self.not_found.load(Ordering::Relaxed)
    }
}

impl BulkOpListener for CountingListener {
    fn found(&self, _id: &ObjectId, _size: usize) {
        self.found.fetch_add(1, Ordering::Relaxed);
    }

    fn inserted(&self, _id: &ObjectId, _size: usize) {
        self.inserted.fetch_add(1, Ordering::Relaxed);
    }

    fn already_exists(&self, _id: &ObjectId) {
        self.existing.fetch_add(1, Ordering::Relaxed);
    }

    fn not_found(&self, _id: &ObjectId) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }
}
