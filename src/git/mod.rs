//! Git plumbing for the metadata repository.
//!
//! The database itself knows nothing about git; this module resolves the
//! commits taking part in a merge, reads files at a commit and exports the
//! metadata directory of another commit so it can be opened as a database.

mod commit;
mod error;
mod refs;
mod repository;
mod tree;
mod types;
mod worktree;

pub use commit::{CommitBuilder, CommitInfo};
pub use error::{GitError, GitResult};
pub use refs::{RefManager, GITHEAD_PREFIX};
pub use repository::GitRepository;
pub use tree::TreeHandle;
pub use types::{BranchName, CommitId, GitSignature, TreeId};
pub use worktree::{Worktree, WORKTREE_PREFIX};
