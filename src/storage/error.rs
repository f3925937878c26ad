//! Storage layer error types
//!
//! All errors that can occur while reading or writing object files are defined here.
//! We use `thiserror` for ergonomic error definition and better error messages

use std::path::PathBuf;

use thiserror::Error;

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// no object file exists at the resolved path
    #[error("object not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// the key is neither a valid oid nor a usable path
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (filesystem level, including zstd stream failures)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// check if this error indicates the object doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
