//! Error types for the episode store.

use thiserror::Error;

/// Errors from the local episode store.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The underlying database rejected an operation.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A row failed to serialize or deserialize.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store was closed; no further operations are possible.
    #[error("Store is closed")]
    Closed,
}

/// Alias for Result with MemoryError.
pub type MemoryResult<T> = Result<T, MemoryError>;
