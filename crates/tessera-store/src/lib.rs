//! Content-addressed object database and value model for Tessera.
//!
//! Every piece of versioned data (trees, features, schemas, commits, tags)
//! is an immutable object identified by the BLAKE3 hash of its canonical
//! encoding, domain-separated by object kind.
//!
//! # Object Types
//!
//! - [`RevTree`] -- a sharded collection of [`Node`]s, flat or bucketed
//! - [`RevFeature`] -- a record: ordered optional [`Value`]s
//! - [`RevFeatureType`] -- a schema with its reference frame
//! - [`RevCommit`] / [`RevTag`] -- history
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectDatabase`] trait:
//!
//! - [`InMemoryObjectDatabase`] -- `HashMap`-based store for tests and embedding
//! - [`FileObjectDatabase`] -- loose zstd-compressed files with CRC framing
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Decoding recomputes the id and rejects bytes stored under the wrong key.
//! 3. Concurrent reads are always safe; racing writers of one id converge.
//! 4. Reading an absent id is an error, never a silent skip.

pub mod codec;
pub mod config;
pub mod error;
pub mod file;
pub mod listener;
pub mod memory;
pub mod object;
pub mod order;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use file::FileObjectDatabase;
pub use listener::{BulkOpListener, CountingListener, NoopListener};
pub use memory::InMemoryObjectDatabase;
pub use object::{
    append_child, parent_path, AttributeDescriptor, Bucket, Node, NodeKind, NodeRef, ObjectKind,
    Person, RevCommit, RevFeature, RevFeatureType, RevObject, RevTag, RevTree, Revision, TreeBody,
    Value, ValueType, BUCKET_COUNT,
};
pub use order::{bucket_of, storage_cmp, NodeStorageOrder, MAX_BUCKET_DEPTH};
pub use traits::ObjectDatabase;
