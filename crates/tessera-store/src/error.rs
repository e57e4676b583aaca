use tessera_types::{ObjectId, TypeError};

/// Errors from object database operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// The decoded object hashes to a different id than the key it was read under.
    #[error("hash mismatch for {id}: decoded content hashes to {computed}")]
    HashMismatch { id: ObjectId, computed: ObjectId },

    /// The object data is malformed or cannot be decoded.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failure.
    #[error("compression error: {0}")]
    Compression(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Attempted to write a null object ID.
    #[error("cannot store object with null ID")]
    NullObjectId,

    /// An abbreviated id is too short or not hexadecimal.
    #[error("invalid object id prefix: {0:?}")]
    InvalidPrefix(String),

    /// A value object was constructed from inconsistent parts.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// The configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
