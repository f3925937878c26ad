//! storage layer for provstore
//!
//! this module persists one JSON object per file under a metadata root.
//! The upper layers (codec, database) hand it `serde_json::Value`s and never
//! touch the filesystem directly.
//!
//!  # Layout
//!
//! ```text
//! <root>/root                       root B-tree (named indices, project, ...)
//! <root>/ab/cd/abcd...              one file per object, named by its oid
//! ```
//!
//! Files are either plain JSON or a zstd frame; the reader tells them apart
//! by the magic number, so both can live side by side.
//!
//! # Usage
//!
//! ```ignore
//! use provstore::storage::{Oid, Storage};
//!
//! let storage = Storage::new(".renku/metadata");
//! let oid = Oid::from_domain_id("/datasets/abc");
//! storage.store(oid.as_str(), &json!({"name": "my-data"}), true, false)?;
//! let value = storage.load(oid.as_str(), false)?;
//! ```

mod blob;
mod error;
mod types;

// Re-export public API
pub use blob::{is_compressed, Storage, ZSTD_MAGIC};
pub use error::{StorageError, StorageResult};
pub use types::{Oid, OID_LENGTH};
