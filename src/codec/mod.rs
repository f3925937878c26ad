//! JSON wire format for persistent objects.
//!
//! Every stored document is a JSON object carrying an envelope:
//!
//! ```text
//! @renku_data_type   registered type name
//! @renku_oid         oid of a persistent object or index
//! @renku_data_value  payload of containers and builtin values
//! @renku_reference   marks a stub pointing at another object
//! ```
//!
//! The writer and the reader traverse an object graph in the same order
//! (fields sorted by name, depth first). Plain objects seen a second time in
//! one pass are written as their first-seen position, and the reader
//! resolves that position against the objects it has read so far.

pub mod node;
pub mod reader;
pub mod registry;
pub mod writer;

pub use node::{Fields, Node, PlainObject, SharedObject};
pub use reader::{ObjectReader, Record};
pub use registry::{TypeKind, TypeRegistry, TypeSpec, TypeTag};
pub use writer::ObjectWriter;

pub const DATA_TYPE: &str = "@renku_data_type";
pub const OID: &str = "@renku_oid";
pub const DATA_VALUE: &str = "@renku_data_value";
pub const REFERENCE: &str = "@renku_reference";
