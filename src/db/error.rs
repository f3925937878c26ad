//! Database error types.
//!
//! Storage failures propagate unwrapped through `Storage`. Consistency
//! violations (oid drift, stale index keys, writing a frozen object) are
//! reported as errors too, but `is_programming_error` flags them so callers
//! can treat them as bugs rather than user-correctable conditions.

use thiserror::Error;

use crate::storage::{Oid, StorageError};

/// result type alias for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("object not found: {0}")]
    ObjectNotFound(Oid),

    /// a stored type tag that is not in the registry
    #[error("type not permitted: {0}")]
    TypeNotPermitted(String),

    #[error("corrupt data: {0}")]
    CorruptData(String),

    #[error("oid mismatch: expected {expected}, found {actual}")]
    OidMismatch { expected: Oid, actual: Oid },

    #[error("cannot modify frozen object {0}")]
    Frozen(String),

    #[error("object is a ghost, load it through the database first")]
    Ghost,

    #[error("root entry '{0}' already exists")]
    NameTaken(String),

    #[error("no root entry named '{0}'")]
    NoSuchRootEntry(String),

    #[error("index key mismatch: derived '{expected}', given '{given}'")]
    IndexKeyMismatch { expected: String, given: String },

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("index has no key attribute and no key was given")]
    MissingKey,

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("type {0} is not independently persistent")]
    NotPersistent(String),

    #[error("missing field '{field}' on {type_name}")]
    MissingField { type_name: String, field: String },

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

impl DatabaseError {
    /// the object or file does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            DatabaseError::ObjectNotFound(_) => true,
            DatabaseError::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// errors that indicate a bug in the calling code
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::OidMismatch { .. }
                | DatabaseError::Frozen(_)
                | DatabaseError::Ghost
                | DatabaseError::NameTaken(_)
                | DatabaseError::IndexKeyMismatch { .. }
                | DatabaseError::MissingKey
        )
    }
}
