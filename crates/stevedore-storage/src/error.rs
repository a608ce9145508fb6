//! Error types for the manifest models.

use thiserror::Error;

/// Result type alias for manifest model operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in a manifest model.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("store error: {0}")]
    Store(#[from] stevedore_store::StoreError),

    #[error("bad filter: {0}")]
    Filter(String),
}
