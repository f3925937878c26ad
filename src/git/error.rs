//! Git layer error types
//!
//! All errors that can occur while talking to the repository are defined here.
//! We use `thiserror` for ergonomic error definition and better error messages

use std::path::PathBuf;

use thiserror::Error;

/// the main error type for git operations
#[derive(Debug, Error)]
pub enum GitError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// the commit was not found
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// no file or directory at the path in the given commit
    #[error("path not found at {commit}: {}", path.display())]
    PathNotFound { commit: String, path: PathBuf },

    /// repo is not initialized
    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    /// repo is empty (no commits)
    #[error("repository is empty: no commits found")]
    EmptyRepository,

    /// the repository is bare
    #[error("repository has no working directory")]
    NoWorkdir,

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, GitError::CommitNotFound(_) | GitError::PathNotFound { .. })
    }
}

/// result type alias for git operations
pub type GitResult<T> = Result<T, GitError>;
