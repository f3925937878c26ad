//! Registry of persistable types.
//!
//! Every type tag that may appear in a stored object is registered here up
//! front. Reading a tag that is not in the registry fails with
//! `TypeNotPermitted`; nothing is ever resolved from the string alone.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::db::{DatabaseError, DatabaseResult};

/// A registered type name, e.g. `renku.domain_model.dataset.Dataset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(&'static str);

impl TypeTag {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sorted persistent mapping (also used for the root).
pub const BTREE: TypeTag = TypeTag::new("renku.infrastructure.database.RenkuOOBTree");
/// Leaf bucket of a B-tree.
pub const BUCKET: TypeTag = TypeTag::new("BTrees.OOBTree.OOBucket");
/// Sorted persistent set of string members.
pub const TREE_SET: TypeTag = TypeTag::new("BTrees.OOBTree.OOTreeSet");
/// Keyed view over a homogeneous collection; inlined in its parent.
pub const INDEX: TypeTag = TypeTag::new("renku.infrastructure.database.Index");

pub const SET: TypeTag = TypeTag::new("builtins.set");
pub const FROZEN_SET: TypeTag = TypeTag::new("builtins.frozenset");
pub const DICT: TypeTag = TypeTag::new("builtins.dict");
pub const TYPE: TypeTag = TypeTag::new("builtins.type");
pub const DATETIME: TypeTag = TypeTag::new("datetime.datetime");

/// How a type is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// persistent object whose fields are written inline in its own file
    Record,
    /// persistent mapping whose entries go under `@renku_data_value`
    Container,
    /// persistent set of string members
    TreeSet,
    /// the `Index` container
    Index,
    /// non-persistent object, inlined wherever it is referenced
    Plain,
    /// sets, dicts, datetimes, type references
    Builtin,
}

impl TypeKind {
    /// kinds that own a file and an oid
    pub fn is_persistent(self) -> bool {
        matches!(self, TypeKind::Record | TypeKind::Container | TypeKind::TreeSet)
    }
}

/// Registration entry for one type.
#[derive(Debug, Clone, Copy)]
pub struct TypeSpec {
    pub tag: TypeTag,
    pub kind: TypeKind,
    /// store files of this type zstd-compressed
    pub compressed: bool,
    /// freeze instances when they are loaded from storage
    pub frozen_on_load: bool,
    /// instances carry a `derived_from` chain
    pub derivable: bool,
}

impl TypeSpec {
    pub const fn record(tag: TypeTag) -> Self {
        Self {
            tag,
            kind: TypeKind::Record,
            compressed: true,
            frozen_on_load: false,
            derivable: false,
        }
    }

    /// containers are kept uncompressed so Git diffs stay readable
    pub const fn container(tag: TypeTag) -> Self {
        Self {
            tag,
            kind: TypeKind::Container,
            compressed: false,
            frozen_on_load: false,
            derivable: false,
        }
    }

    pub const fn plain(tag: TypeTag) -> Self {
        Self {
            tag,
            kind: TypeKind::Plain,
            compressed: false,
            frozen_on_load: false,
            derivable: false,
        }
    }

    const fn of_kind(tag: TypeTag, kind: TypeKind) -> Self {
        Self {
            tag,
            kind,
            compressed: false,
            frozen_on_load: false,
            derivable: false,
        }
    }

    pub const fn frozen(mut self) -> Self {
        self.frozen_on_load = true;
        self
    }

    pub const fn derivable(mut self) -> Self {
        self.derivable = true;
        self
    }

    pub const fn uncompressed(mut self) -> Self {
        self.compressed = false;
        self
    }
}

/// Allow-list of types the codec may read or write.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<&'static str, TypeSpec>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// a registry holding the built-in containers and value types only
    pub fn new() -> Self {
        let mut registry = Self { types: HashMap::new() };
        registry.register(TypeSpec::container(BTREE));
        registry.register(TypeSpec::container(BUCKET));
        registry.register(TypeSpec::of_kind(TREE_SET, TypeKind::TreeSet));
        registry.register(TypeSpec::of_kind(INDEX, TypeKind::Index));
        for tag in [SET, FROZEN_SET, DICT, TYPE, DATETIME] {
            registry.register(TypeSpec::of_kind(tag, TypeKind::Builtin));
        }
        registry
    }

    /// built-ins plus every domain type of the provenance model
    pub fn standard() -> Arc<Self> {
        let mut registry = Self::new();
        crate::model::register_types(&mut registry);
        Arc::new(registry)
    }

    pub fn register(&mut self, spec: TypeSpec) {
        self.types.insert(spec.tag.name(), spec);
    }

    /// look up a type name read from storage
    pub fn resolve(&self, name: &str) -> DatabaseResult<&TypeSpec> {
        self.types
            .get(name)
            .ok_or_else(|| DatabaseError::TypeNotPermitted(name.to_string()))
    }

    /// look up a tag about to be written
    pub fn spec(&self, tag: TypeTag) -> DatabaseResult<&TypeSpec> {
        self.resolve(tag.name())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }
}
