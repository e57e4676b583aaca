//! Error types for the diff crate.

use tessera_store::StoreError;

/// Errors that can occur during diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// The traversal was cancelled through its [`CancelToken`](crate::CancelToken).
    #[error("diff cancelled")]
    Cancelled,

    /// A closing tree call did not match the tree most recently opened.
    #[error("unbalanced traversal: {0}")]
    UnbalancedTraversal(String),

    /// A path filter is empty or has empty segments.
    #[error("invalid path filter {0:?}")]
    InvalidPathFilter(String),

    /// The background diff worker could not be started or panicked.
    #[error("diff worker failed: {0}")]
    Worker(String),

    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
