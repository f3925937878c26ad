//!  Reference lookup.
//!
//!  Git refs are pointers to commits. This module handles:
//! - HEAD and the main branch
//! - Discovery of the commits taking part in a merge
//!
//! During a merge Git exports one `GITHEAD_<sha>` environment variable per
//! participating commit. Everything except the current HEAD is a remote.

use git2::Repository;

use crate::git::error::{GitError, GitResult};
use crate::git::types::{BranchName, CommitId};

/// prefix of the environment variables git sets for merge participants
pub const GITHEAD_PREFIX: &str = "GITHEAD_";

/// Manages Git references (branches).
pub struct RefManager;

impl RefManager {
    /// Get the current HEAD commit.
    pub fn head_commit(repo: &Repository) -> GitResult<CommitId> {
        let head = repo.head().map_err(|e| {
            if e.code() == git2::ErrorCode::UnbornBranch {
                GitError::EmptyRepository
            } else {
                GitError::Git(e)
            }
        })?;

        let commit = head.peel_to_commit()?;
        Ok(CommitId::new(commit.id()))
    }

    /// Create the main branch if it doesn't exist and point HEAD at it.
    pub fn init_main_branch(repo: &Repository, initial_commit: CommitId) -> GitResult<()> {
        let main = BranchName::main();

        if repo.find_reference(&main.as_ref_path()).is_err() {
            let commit = repo.find_commit(initial_commit.raw())?;
            repo.branch(main.as_str(), &commit, false)?;
        }

        repo.set_head(&main.as_ref_path())?;

        Ok(())
    }

    /// Commits named by `GITHEAD_<sha>` variables, excluding `head`.
    ///
    /// Order follows the input; variables with an unparsable sha are skipped.
    pub fn merge_participants<I>(vars: I, head: CommitId) -> Vec<CommitId>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut participants = Vec::new();
        for (key, _) in vars {
            let Some(sha) = key.strip_prefix(GITHEAD_PREFIX) else { continue };
            match CommitId::from_hex(sha) {
                Ok(commit) if commit != head && !participants.contains(&commit) => participants.push(commit),
                Ok(_) => {}
                Err(_) => tracing::debug!(variable = %key, "ignoring merge variable without a commit sha"),
            }
        }
        participants
    }
}
