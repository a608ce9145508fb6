//! Error types for the key store.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
///
/// `NotFound` is the only recoverable variant: higher-level accessors
/// normalize it per their own contract (empty list, `None`, ...). All
/// other variants propagate unmodified.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("failed to open database: {0}")]
    Open(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transaction error: {0}")]
    Txn(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

impl StoreError {
    /// Whether this error just means the key was absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
