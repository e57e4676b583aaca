use tessera_store::{NodeKind, StoreError};

/// Errors from tree construction, lookup and editing.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Two entries of different kinds were placed under one name.
    #[error("ambiguous path {name:?}: a {existing} entry exists, cannot insert a {inserted}")]
    AmbiguousPath {
        name: String,
        existing: NodeKind,
        inserted: NodeKind,
    },

    /// An entry name is empty or contains a path separator.
    #[error("invalid entry name {0:?}")]
    InvalidName(String),

    /// A slash-delimited path has empty segments or leading/trailing slashes.
    #[error("invalid path {0:?}")]
    InvalidPath(String),

    /// Normalization threshold or depth limit out of range.
    #[error("invalid tree format: {0}")]
    InvalidFormat(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
