//! Domain records stored in the database.
//!
//! Each record type has a typed Rust form implementing [`Persistable`] and a
//! registered type tag. The database and the merge logic work on the untyped
//! field maps; the typed forms are for callers.

mod activity;
mod catalog;
mod dataset;
pub(crate) mod fields;
mod plan;
mod project;

pub use activity::{Activity, ACTIVITY};
pub use catalog::{Catalog, CATALOG};
pub use dataset::{Dataset, DatasetFile, DATASET, DATASET_FILE};
pub use plan::{Plan, PLAN};
pub use project::{Annotation, Project, TemplateMetadata, ANNOTATION, METADATA_VERSION, PROJECT, TEMPLATE_METADATA};

use crate::codec::{Fields, TypeRegistry, TypeSpec, TypeTag};
use crate::db::{Database, DatabaseResult, ObjectHandle};

/// A domain record that maps to and from an object's fields.
pub trait Persistable: Sized {
    const TYPE: TypeTag;

    fn to_fields(&self) -> Fields;

    fn from_fields(fields: &Fields) -> DatabaseResult<Self>;
}

/// Root entry holding the project.
pub const PROJECT_ENTRY: &str = "project";
/// Root entry holding the activity catalog.
pub const CATALOG_ENTRY: &str = "activity-catalog";

pub const DATASETS_INDEX: &str = "datasets";
pub const PLANS_INDEX: &str = "plans";
pub const PLANS_BY_NAME_INDEX: &str = "plans-by-name";
pub const ACTIVITIES_INDEX: &str = "activities";

/// add every domain type to a registry
pub fn register_types(registry: &mut TypeRegistry) {
    registry.register(TypeSpec::record(PROJECT));
    registry.register(TypeSpec::record(DATASET).derivable());
    registry.register(TypeSpec::record(PLAN).derivable());
    registry.register(TypeSpec::record(ACTIVITY).frozen());
    // kept uncompressed so textual diffs stay usable
    registry.register(TypeSpec::record(CATALOG).uncompressed());

    registry.register(TypeSpec::plain(ANNOTATION));
    registry.register(TypeSpec::plain(TEMPLATE_METADATA));
    registry.register(TypeSpec::plain(DATASET_FILE));
}

/// create the standard indices and root objects of a fresh project database
pub fn initialize_database(db: &Database, project: &Project) -> DatabaseResult<ObjectHandle> {
    db.add_index(DATASETS_INDEX, DATASET, Some("name"))?;
    db.add_index(PLANS_INDEX, PLAN, Some("id"))?;
    db.add_index(PLANS_BY_NAME_INDEX, PLAN, Some("name"))?;
    db.add_index(ACTIVITIES_INDEX, ACTIVITY, Some("id"))?;

    let catalog = db.insert(&Catalog::new())?;
    db.add_root_object(CATALOG_ENTRY, &catalog)?;

    let project = db.insert(project)?;
    db.add_root_object(PROJECT_ENTRY, &project)?;
    tracing::info!(project = %project.domain_id().unwrap_or_default(), "initialized database");
    Ok(project)
}
