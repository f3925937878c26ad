//! provstore - a Git-aware persistent object store for provenance metadata
//!
//! Objects are stored one file per object under a metadata directory that
//! lives inside a Git repository. Objects reference each other by oid and
//! are loaded lazily. Because the files are structured data, conflicting
//! edits from different branches are merged on the object graph instead of
//! line by line.
//!
//! # Example
//!
//! ```no_run
//! use provstore::db::{Database, DatabaseConfig};
//! use provstore::model::{initialize_database, Project};
//!
//! let db = Database::open(DatabaseConfig::new(".renku/metadata")).unwrap();
//! initialize_database(&db, &Project::new("group", "demo")).unwrap();
//! db.commit().unwrap();
//! ```

pub mod codec;
pub mod db;
pub mod git;
pub mod merge;
pub mod model;
pub mod storage;
