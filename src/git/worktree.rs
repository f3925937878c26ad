//! Temporary on-disk checkouts of the metadata directory.
//!
//! Merging needs the other side's database as files it can open. Rather
//! than a full checkout, only the metadata subtree of the commit is written
//! into a temporary directory, which is removed again when the merge is done.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::git::types::CommitId;

/// prefix of the temporary directories holding exported metadata
pub const WORKTREE_PREFIX: &str = "metadata-merge-";

/// the metadata directory of one commit, exported to a temp dir
#[derive(Debug)]
pub struct Worktree {
    dir: TempDir,
    metadata_path: PathBuf,
    commit: CommitId,
}

impl Worktree {
    pub(crate) fn new(dir: TempDir, subtree: &Path, commit: CommitId) -> Self {
        let metadata_path = dir.path().join(subtree);
        Self {
            dir,
            metadata_path,
            commit,
        }
    }

    /// root of the temporary directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// where the exported metadata lives
    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    pub fn commit(&self) -> CommitId {
        self.commit
    }

    /// delete the directory; failures are logged, never raised
    pub fn remove(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove merge worktree");
        } else {
            tracing::debug!(commit = %self.commit.short(), "removed merge worktree");
        }
    }
}
