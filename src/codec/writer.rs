//! Serialization of persistent objects to the JSON wire format.
//!
//! A persistent object is written as one JSON document. Nested persistent
//! objects become `{type, oid, reference}` stubs and are stored in their own
//! files; indices are inlined but keep their oid. Plain objects are inlined
//! the first time they are reached and written as positional back-references
//! afterwards, which is what lets cyclic plain graphs round-trip.

use std::collections::HashMap;

use serde_json::{Map, Number, Value};

use crate::codec::node::{Fields, Node, SharedObject};
use crate::codec::registry::{self, TypeKind, TypeRegistry};
use crate::codec::{DATA_TYPE, DATA_VALUE, OID, REFERENCE};
use crate::db::{Database, DatabaseError, DatabaseResult, Index, ObjectHandle, ObjectStatus};

/// Writes one object at a time; create a new writer per serialization pass.
pub struct ObjectWriter<'db> {
    database: &'db Database,
    registry: &'db TypeRegistry,
    /// plain object key -> position in first-seen order
    seen: HashMap<u64, usize>,
    /// register new or dirty nested objects with the database
    register_nested: bool,
}

impl<'db> ObjectWriter<'db> {
    pub fn new(database: &'db Database) -> Self {
        Self {
            database,
            registry: database.registry(),
            seen: HashMap::new(),
            register_nested: true,
        }
    }

    /// a writer without registration side effects, for rendering objects
    pub fn detached(database: &'db Database) -> Self {
        Self {
            register_nested: false,
            ..Self::new(database)
        }
    }

    /// serialize a loaded persistent object into its stored document
    ///
    /// assigns an oid to the object if it has none yet
    pub fn serialize(&mut self, object: &ObjectHandle) -> DatabaseResult<Value> {
        self.seen.clear();

        let oid = match object.oid() {
            Some(oid) => oid,
            None => self.database.assign_oid(object),
        };
        let tag = object.type_tag().ok_or(DatabaseError::Ghost)?;
        let spec = *self.registry.spec(tag)?;
        let fields = object.fields()?;

        let mut document = Map::new();
        document.insert(DATA_TYPE.to_string(), Value::String(tag.name().to_string()));
        document.insert(OID.to_string(), Value::String(oid.to_string()));

        match spec.kind {
            TypeKind::Record => {
                for (name, node) in &fields {
                    document.insert(name.clone(), self.write_node(node)?);
                }
            }
            TypeKind::Container => {
                let mut entries = Map::new();
                for (key, node) in &fields {
                    entries.insert(key.clone(), self.write_node(node)?);
                }
                document.insert(DATA_VALUE.to_string(), Value::Object(entries));
            }
            TypeKind::TreeSet => {
                let members = fields.keys().map(|k| Value::String(k.clone())).collect();
                document.insert(DATA_VALUE.to_string(), Value::Array(members));
            }
            TypeKind::Index | TypeKind::Plain | TypeKind::Builtin => {
                return Err(DatabaseError::NotPersistent(tag.name().to_string()));
            }
        }

        Ok(Value::Object(document))
    }

    /// serialize a bare field map, used to render objects for display
    pub fn serialize_fields(&mut self, fields: &Fields) -> DatabaseResult<Value> {
        self.seen.clear();
        let mut document = Map::new();
        for (name, node) in fields {
            document.insert(name.clone(), self.write_node(node)?);
        }
        Ok(Value::Object(document))
    }

    fn write_node(&mut self, node: &Node) -> DatabaseResult<Value> {
        let value = match node {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Int(i) => Value::Number((*i).into()),
            Node::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| DatabaseError::InvalidField {
                    field: "<float>".to_string(),
                    reason: format!("{} is not representable in JSON", f),
                })?,
            Node::Str(s) => Value::String(s.clone()),
            Node::DateTime(dt) => tagged(registry::DATETIME.name(), Value::String(dt.to_rfc3339())),
            Node::List(items) => Value::Array(self.write_all(items)?),
            Node::Set { items, frozen } => {
                let tag = if *frozen { registry::FROZEN_SET } else { registry::SET };
                tagged(tag.name(), Value::Array(self.write_all(items)?))
            }
            Node::Map(map) => {
                let mut object = Map::new();
                for (key, value) in map {
                    object.insert(key.clone(), self.write_node(value)?);
                }
                // maps whose keys collide with the envelope get wrapped
                if map.keys().any(|k| k.starts_with('@')) {
                    tagged(registry::DICT.name(), Value::Object(object))
                } else {
                    Value::Object(object)
                }
            }
            Node::Type(tag) => {
                self.registry.spec(*tag)?;
                tagged(registry::TYPE.name(), Value::String(tag.name().to_string()))
            }
            Node::Object(object) => self.write_plain(object)?,
            Node::Persistent(handle) => self.write_reference(handle)?,
            Node::Index(index) => self.write_index(index)?,
        };
        Ok(value)
    }

    fn write_all(&mut self, items: &[Node]) -> DatabaseResult<Vec<Value>> {
        items.iter().map(|item| self.write_node(item)).collect()
    }

    fn write_plain(&mut self, object: &SharedObject) -> DatabaseResult<Value> {
        let tag = object.type_tag();

        if let Some(position) = self.seen.get(&object.key()) {
            let mut stub = Map::new();
            stub.insert(DATA_TYPE.to_string(), Value::String(tag.name().to_string()));
            stub.insert(REFERENCE.to_string(), Value::Bool(true));
            stub.insert(DATA_VALUE.to_string(), Value::Number((*position as u64).into()));
            return Ok(Value::Object(stub));
        }

        let spec = self.registry.spec(tag)?;
        if spec.kind != TypeKind::Plain {
            return Err(DatabaseError::TypeMismatch {
                expected: "plain object".to_string(),
                found: tag.name().to_string(),
            });
        }

        let position = self.seen.len();
        self.seen.insert(object.key(), position);

        // snapshot so no lock is held while descending into a possible cycle
        let fields = object.read().fields.clone();
        let mut document = Map::new();
        document.insert(DATA_TYPE.to_string(), Value::String(tag.name().to_string()));
        for (name, node) in &fields {
            document.insert(name.clone(), self.write_node(node)?);
        }
        Ok(Value::Object(document))
    }

    fn write_reference(&mut self, handle: &ObjectHandle) -> DatabaseResult<Value> {
        if handle.type_tag().is_none() {
            self.database.materialize(handle)?;
        }
        let tag = handle.type_tag().ok_or(DatabaseError::Ghost)?;

        let oid = match handle.oid() {
            Some(oid) => oid,
            None => self.database.assign_oid(handle),
        };
        if self.register_nested && matches!(handle.status(), ObjectStatus::New | ObjectStatus::Dirty) {
            self.database.register(handle)?;
        }

        let mut stub = Map::new();
        stub.insert(DATA_TYPE.to_string(), Value::String(tag.name().to_string()));
        stub.insert(OID.to_string(), Value::String(oid.to_string()));
        stub.insert(REFERENCE.to_string(), Value::Bool(true));
        Ok(Value::Object(stub))
    }

    fn write_index(&mut self, index: &Index) -> DatabaseResult<Value> {
        let mut state = Map::new();
        state.insert("name".to_string(), Value::String(index.name().to_string()));
        state.insert("object_type".to_string(), self.write_node(&Node::Type(index.object_type()))?);
        state.insert(
            "attribute".to_string(),
            index.attribute().map(|a| Value::String(a.to_string())).unwrap_or(Value::Null),
        );
        state.insert("entries".to_string(), self.write_reference(index.entries())?);

        let mut document = Map::new();
        document.insert(DATA_TYPE.to_string(), Value::String(registry::INDEX.name().to_string()));
        document.insert(OID.to_string(), Value::String(index.oid().to_string()));
        document.insert(DATA_VALUE.to_string(), Value::Object(state));
        Ok(Value::Object(document))
    }
}

fn tagged(tag: &str, value: Value) -> Value {
    let mut document = Map::new();
    document.insert(DATA_TYPE.to_string(), Value::String(tag.to_string()));
    document.insert(DATA_VALUE.to_string(), value);
    Value::Object(document)
}
