//! The object database.
//!
//! This module ties storage and the codec together into a unit of work:
//! objects are registered, mutated in memory, and written out by `commit()`.
//!
//! # Example
//!
//! ```no_run
//! use provstore::db::{Database, DatabaseConfig};
//! use provstore::model::Dataset;
//!
//! let db = Database::open(DatabaseConfig::new(".renku/metadata")).unwrap();
//! let dataset = db.insert(&Dataset::new("my-data")).unwrap();
//! db.index("datasets").unwrap().add(&db, &dataset, None, None).unwrap();
//! db.commit().unwrap();
//! ```

mod config;
mod database;
mod error;
mod index;
mod object;

pub use config::{DatabaseConfig, DEFAULT_METADATA_PATH};
pub use database::Database;
pub use error::{DatabaseError, DatabaseResult};
pub use index::{Index, KeyRange};
pub use object::{ObjectHandle, ObjectStatus};
