//! Merge error types

use std::io;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::git::GitError;

/// everything that makes a metadata merge fail
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("git error: {0}")]
    Git(#[from] GitError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// no merge strategy for this pair of values
    #[error("cannot merge {local} with {remote}")]
    UnsupportedType { local: String, remote: String },

    /// the user chose to abort at a conflict prompt
    #[error("merge aborted")]
    Aborted,

    /// none of the remotes had the conflicting object
    #[error("no remote has the object being merged")]
    RemoteObjectNotFound,
}

impl MergeError {
    /// a missing object or path, which makes a remote get skipped
    pub fn is_not_found(&self) -> bool {
        match self {
            MergeError::Database(e) => e.is_not_found(),
            MergeError::Git(e) => e.is_not_found(),
            _ => false,
        }
    }
}

/// result type alias for merge operations
pub type MergeResult<T> = Result<T, MergeError>;
