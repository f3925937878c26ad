//! Structural three-way merge of metadata files.
//!
//! Object files are compressed JSON whose meaning lies in the object graph,
//! so line-based merging is useless on them. The merge driver instead loads
//! the local, base and remote versions of a conflicting object and merges
//! them with a strategy picked by the object's type, asking the user only
//! when two versions cannot be reconciled automatically.
//!
//! # Example
//!
//! ```no_run
//! use provstore::db::{Database, DatabaseConfig};
//! use provstore::git::GitRepository;
//! use provstore::merge::{GitMerger, MergeRequest, StdioPrompter};
//!
//! let repository = GitRepository::open(".").unwrap();
//! let database = Database::open(DatabaseConfig::default()).unwrap();
//! let request = MergeRequest::new("base", "local", "remote");
//! let mut prompter = StdioPrompter;
//! GitMerger::new(&repository, &database, &mut prompter).merge(&request).unwrap();
//! ```

mod compare;
mod diff;
mod error;
mod merger;
mod prompt;
mod strategy;

pub use compare::{compare_objects, derives_from, Resolution};
pub use diff::{structural_diff, Side};
pub use error::{MergeError, MergeResult};
pub use merger::{GitMerger, MergeConfig, MergeRequest};
pub use prompt::{Prompter, ScriptedPrompter, StdioPrompter};
pub use strategy::ObjectMerger;
