use std::collections::HashMap;
use std::sync::RwLock;

use tessera_types::ObjectId;
use tracing::debug;

use crate::codec;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::traits::{normalize_prefix, ObjectDatabase};

/// In-memory, HashMap-based object database.
///
/// Intended for tests and embedding. Objects are kept zstd-compressed behind
/// a `RwLock` for safe concurrent access.
pub struct InMemoryObjectDatabase {
    objects: RwLock<HashMap<ObjectId, Vec<u8>>>,
    config: StoreConfig,
}

impl InMemoryObjectDatabase {
    /// Create a new empty database.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total compressed bytes held.
    pub fn stored_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }

    /// Remove all objects.
    pub fn clear(&self) {
        self.objects.write().expect("lock poisoned").clear();
    }

    /// Sorted list of every stored id.
    pub fn all_ids(&self) -> Vec<ObjectId> {
        let map = self.objects.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for InMemoryObjectDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectDatabase for InMemoryObjectDatabase {
    fn read_raw(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>> {
        let map = self.objects.read().expect("lock poisoned");
        match map.get(id) {
            Some(packed) => codec::decompress(packed, id).map(Some),
            None => Ok(None),
        }
    }

    fn put_raw(&self, id: &ObjectId, data: &[u8]) -> StoreResult<bool> {
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        if self.exists(id)? {
            return Ok(false);
        }
        let packed = codec::compress(data, self.config.compression_level)?;
        let mut map = self.objects.write().expect("lock poisoned");
        if map.contains_key(id) {
            return Ok(false);
        }
        debug!(id = %id.short_hex(), size = data.len(), "inserted object");
        map.insert(*id, packed);
        Ok(true)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }

    fn lookup(&self, prefix: &str) -> StoreResult<Vec<ObjectId>> {
        let prefix = normalize_prefix(prefix)?;
        let map = self.objects.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map
            .keys()
            .filter(|id| id.matches_hex_prefix(&prefix))
            .copied()
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        let mut map = self.objects.write().expect("lock poisoned");
        Ok(map.remove(id).is_some())
    }

    fn verifies_hashes(&self) -> bool {
        self.config.verify_hashes
    }
}

impl std::fmt::Debug for InMemoryObjectDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryObjectDatabase")
            .field("object_count", &count)
            .finish()
    }
}
