//! In-memory value model for persisted object graphs.
//!
//! A persistent object's body is a map of named [`Node`]s. Nodes are plain
//! JSON-like values plus the special cases the codec knows about: sets,
//! datetimes, type references, shared plain objects (which may form cycles),
//! references to other persistent objects, and inlined indices.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::codec::registry::TypeTag;
use crate::db::{Index, ObjectHandle};

/// Named attributes of an object, iterated in key order.
pub type Fields = BTreeMap<String, Node>;

#[derive(Debug, Clone)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    DateTime(DateTime<FixedOffset>),
    List(Vec<Node>),
    Set { items: Vec<Node>, frozen: bool },
    Map(BTreeMap<String, Node>),
    /// non-persistent object, shared by handle
    Object(SharedObject),
    /// reference to an independently stored object
    Persistent(ObjectHandle),
    Index(Index),
    Type(TypeTag),
}

impl Node {
    /// build a set, dropping duplicates while keeping first-seen order
    pub fn set(items: impl IntoIterator<Item = Node>) -> Self {
        let mut unique: Vec<Node> = Vec::new();
        for item in items {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        Node::Set { items: unique, frozen: false }
    }

    pub fn strings<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Node::List(values.into_iter().map(|v| Node::Str(v.into())).collect())
    }

    pub fn string_set<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Node::set(values.into_iter().map(|v| Node::Str(v.into())))
    }

    pub fn opt_str(value: Option<&str>) -> Self {
        value.map(Node::from).unwrap_or(Node::Null)
    }

    pub fn object(type_tag: TypeTag, fields: Fields) -> Self {
        Node::Object(SharedObject::new(PlainObject::new(type_tag, fields)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_persistent(&self) -> Option<&ObjectHandle> {
        match self {
            Node::Persistent(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&SharedObject> {
        match self {
            Node::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<&Index> {
        match self {
            Node::Index(index) => Some(index),
            _ => None,
        }
    }

    /// short description used in diffs and error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "bool",
            Node::Int(_) => "int",
            Node::Float(_) => "float",
            Node::Str(_) => "str",
            Node::DateTime(_) => "datetime",
            Node::List(_) => "list",
            Node::Set { .. } => "set",
            Node::Map(_) => "dict",
            Node::Object(object) => object.type_tag().name(),
            Node::Persistent(handle) => handle.type_tag().map(|t| t.name()).unwrap_or("persistent"),
            Node::Index(_) => "index",
            Node::Type(_) => "type",
        }
    }
}

// Shared plain objects compare by content; a cyclic graph compared against a
// distinct copy of itself does not terminate.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Null, Node::Null) => true,
            (Node::Bool(a), Node::Bool(b)) => a == b,
            (Node::Int(a), Node::Int(b)) => a == b,
            (Node::Float(a), Node::Float(b)) => a == b,
            (Node::Int(a), Node::Float(b)) | (Node::Float(b), Node::Int(a)) => (*a as f64) == *b,
            (Node::Str(a), Node::Str(b)) => a == b,
            (Node::DateTime(a), Node::DateTime(b)) => a == b,
            (Node::List(a), Node::List(b)) => a == b,
            (Node::Set { items: a, .. }, Node::Set { items: b, .. }) => {
                a.len() == b.len() && a.iter().all(|item| b.contains(item))
            }
            (Node::Map(a), Node::Map(b)) => a == b,
            (Node::Object(a), Node::Object(b)) => a.ptr_eq(b) || *a.read() == *b.read(),
            (Node::Persistent(a), Node::Persistent(b)) => a.same_object(b),
            (Node::Index(a), Node::Index(b)) => a.oid() == b.oid(),
            (Node::Type(a), Node::Type(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Str(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::Str(value)
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Bool(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Int(value)
    }
}

impl From<DateTime<FixedOffset>> for Node {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Node::DateTime(value)
    }
}

impl From<Vec<Node>> for Node {
    fn from(value: Vec<Node>) -> Self {
        Node::List(value)
    }
}

impl From<ObjectHandle> for Node {
    fn from(value: ObjectHandle) -> Self {
        Node::Persistent(value)
    }
}

impl From<Index> for Node {
    fn from(value: Index) -> Self {
        Node::Index(value)
    }
}

/// A non-persistent object: a type tag and its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct PlainObject {
    pub type_tag: TypeTag,
    pub fields: Fields,
}

impl PlainObject {
    pub fn new(type_tag: TypeTag, fields: Fields) -> Self {
        Self { type_tag, fields }
    }
}

static NEXT_OBJECT_KEY: AtomicU64 = AtomicU64::new(1);

/// Shared handle to a plain object.
///
/// Each handle gets a process-unique key at creation; the writer uses it to
/// recognise an object it has already emitted in the current pass.
#[derive(Clone)]
pub struct SharedObject {
    key: u64,
    inner: Arc<RwLock<PlainObject>>,
}

impl SharedObject {
    pub fn new(object: PlainObject) -> Self {
        Self {
            key: NEXT_OBJECT_KEY.fetch_add(1, Ordering::Relaxed),
            inner: Arc::new(RwLock::new(object)),
        }
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn type_tag(&self) -> TypeTag {
        self.inner.read().type_tag
    }

    pub fn field(&self, name: &str) -> Option<Node> {
        self.inner.read().fields.get(name).cloned()
    }

    pub fn set_field(&self, name: impl Into<String>, value: impl Into<Node>) {
        self.inner.write().fields.insert(name.into(), value.into());
    }

    pub fn read(&self) -> RwLockReadGuard<'_, PlainObject> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, PlainObject> {
        self.inner.write()
    }

    pub fn ptr_eq(&self, other: &SharedObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SharedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // fields are omitted, the graph may be cyclic
        f.debug_struct("SharedObject")
            .field("key", &self.key)
            .field("type", &self.type_tag())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::registry::TypeTag;

    const POINT: TypeTag = TypeTag::new("tests.Point");

    fn point(x: i64) -> Node {
        let mut fields = Fields::new();
        fields.insert("x".into(), Node::Int(x));
        Node::object(POINT, fields)
    }

    #[test]
    fn test_set_dedupes() {
        let set = Node::string_set(["a", "b", "a"]);
        match set {
            Node::Set { items, .. } => assert_eq!(items.len(), 2),
            other => panic!("expected set, got {:?}", other),
        }
    }

    #[test]
    fn test_set_equality_ignores_order() {
        assert_eq!(Node::string_set(["a", "b"]), Node::string_set(["b", "a"]));
        assert_ne!(Node::string_set(["a"]), Node::string_set(["a", "b"]));
    }

    #[test]
    fn test_plain_objects_compare_by_content() {
        assert_eq!(point(1), point(1));
        assert_ne!(point(1), point(2));
    }

    #[test]
    fn test_shared_object_keys_are_unique() {
        let a = SharedObject::new(PlainObject::new(POINT, Fields::new()));
        let b = SharedObject::new(PlainObject::new(POINT, Fields::new()));
        assert_ne!(a.key(), b.key());
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
    }
}
