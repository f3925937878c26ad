//! Deserialization of stored documents back into object bodies.
//!
//! The reader walks a document in the same order the writer produced it
//! (fields in key order, depth first) and pushes every plain object onto a
//! per-pass stack before reading its fields, so a positional back-reference
//! always points at an object that is already on the stack.

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::codec::node::{Fields, Node, PlainObject, SharedObject};
use crate::codec::registry::{self, TypeKind, TypeRegistry, TypeSpec, TypeTag};
use crate::codec::{DATA_TYPE, DATA_VALUE, OID, REFERENCE};
use crate::db::{Database, DatabaseError, DatabaseResult, Index};
use crate::storage::Oid;

/// A decoded persistent object.
#[derive(Debug, Clone)]
pub struct Record {
    pub type_tag: TypeTag,
    pub oid: Option<Oid>,
    pub fields: Fields,
}

/// Reads one document at a time; create a new reader per pass.
pub struct ObjectReader<'db> {
    database: &'db Database,
    registry: &'db TypeRegistry,
    /// plain objects in first-seen order
    stack: Vec<SharedObject>,
}

impl<'db> ObjectReader<'db> {
    pub fn new(database: &'db Database) -> Self {
        Self {
            database,
            registry: database.registry(),
            stack: Vec::new(),
        }
    }

    /// decode a stored persistent object
    pub fn deserialize(&mut self, data: &Value) -> DatabaseResult<Record> {
        self.stack.clear();

        let document = data
            .as_object()
            .ok_or_else(|| corrupt("top-level document is not a JSON object"))?;
        let spec = *self.spec_of(document)?;
        let oid = match document.get(OID) {
            Some(Value::String(oid)) => Some(Oid::new(oid.as_str()).map_err(DatabaseError::Storage)?),
            Some(_) => return Err(corrupt("object id is not a string")),
            None => None,
        };

        let fields = match spec.kind {
            TypeKind::Record => {
                let mut fields = Fields::new();
                for (name, value) in document.iter().filter(|(k, _)| !is_envelope_key(k)) {
                    fields.insert(name.clone(), self.read_node(value)?);
                }
                fields
            }
            TypeKind::Container => {
                let entries = data_value(document)?
                    .as_object()
                    .ok_or_else(|| corrupt("container entries are not a JSON object"))?;
                let mut fields = Fields::new();
                for (key, value) in entries {
                    fields.insert(key.clone(), self.read_node(value)?);
                }
                fields
            }
            TypeKind::TreeSet => {
                let members = data_value(document)?
                    .as_array()
                    .ok_or_else(|| corrupt("tree set members are not a JSON array"))?;
                let mut fields = Fields::new();
                for member in members {
                    let member = member.as_str().ok_or_else(|| corrupt("tree set member is not a string"))?;
                    fields.insert(member.to_string(), Node::Bool(true));
                }
                fields
            }
            TypeKind::Index | TypeKind::Plain | TypeKind::Builtin => {
                return Err(DatabaseError::NotPersistent(spec.tag.name().to_string()));
            }
        };

        Ok(Record {
            type_tag: spec.tag,
            oid,
            fields,
        })
    }

    fn spec_of(&self, document: &Map<String, Value>) -> DatabaseResult<&'db TypeSpec> {
        match document.get(DATA_TYPE) {
            Some(Value::String(name)) => self.registry.resolve(name),
            _ => Err(corrupt("missing type tag")),
        }
    }

    fn read_node(&mut self, value: &Value) -> DatabaseResult<Node> {
        let node = match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Node::Int(i),
                None => Node::Float(n.as_f64().ok_or_else(|| corrupt("unsupported number"))?),
            },
            Value::String(s) => Node::Str(s.clone()),
            Value::Array(items) => Node::List(self.read_all(items)?),
            Value::Object(document) if !document.contains_key(DATA_TYPE) => {
                let mut map = std::collections::BTreeMap::new();
                for (key, value) in document {
                    map.insert(key.clone(), self.read_node(value)?);
                }
                Node::Map(map)
            }
            Value::Object(document) => self.read_tagged(document)?,
        };
        Ok(node)
    }

    fn read_all(&mut self, items: &[Value]) -> DatabaseResult<Vec<Node>> {
        items.iter().map(|item| self.read_node(item)).collect()
    }

    fn read_tagged(&mut self, document: &Map<String, Value>) -> DatabaseResult<Node> {
        let spec = *self.spec_of(document)?;

        match spec.kind {
            TypeKind::Builtin => self.read_builtin(spec.tag, document),
            TypeKind::Index => self.read_index(document),
            TypeKind::Plain => self.read_plain(spec.tag, document),
            TypeKind::Record | TypeKind::Container | TypeKind::TreeSet => {
                if document.get(REFERENCE) != Some(&Value::Bool(true)) {
                    return Err(corrupt("persistent object inlined without a reference marker"));
                }
                let oid = match document.get(OID) {
                    Some(Value::String(oid)) => Oid::new(oid.as_str()).map_err(DatabaseError::Storage)?,
                    _ => return Err(corrupt("persistent reference without an oid")),
                };
                Ok(Node::Persistent(self.database.ghost(oid, spec.tag)))
            }
        }
    }

    fn read_builtin(&mut self, tag: TypeTag, document: &Map<String, Value>) -> DatabaseResult<Node> {
        let value = data_value(document)?;
        match tag {
            registry::DATETIME => {
                let text = value.as_str().ok_or_else(|| corrupt("datetime is not a string"))?;
                let parsed = DateTime::parse_from_rfc3339(text)
                    .map_err(|e| corrupt(&format!("invalid datetime '{}': {}", text, e)))?;
                Ok(Node::DateTime(parsed))
            }
            registry::SET | registry::FROZEN_SET => {
                let items = value.as_array().ok_or_else(|| corrupt("set value is not an array"))?;
                Ok(Node::Set {
                    items: self.read_all(items)?,
                    frozen: tag == registry::FROZEN_SET,
                })
            }
            registry::DICT => {
                let entries = value.as_object().ok_or_else(|| corrupt("dict value is not an object"))?;
                let mut map = std::collections::BTreeMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.read_node(value)?);
                }
                Ok(Node::Map(map))
            }
            registry::TYPE => {
                let name = value.as_str().ok_or_else(|| corrupt("type reference is not a string"))?;
                Ok(Node::Type(self.registry.resolve(name)?.tag))
            }
            other => Err(DatabaseError::TypeNotPermitted(other.name().to_string())),
        }
    }

    fn read_plain(&mut self, tag: TypeTag, document: &Map<String, Value>) -> DatabaseResult<Node> {
        if document.get(REFERENCE) == Some(&Value::Bool(true)) {
            let position = data_value(document)?
                .as_u64()
                .ok_or_else(|| corrupt("back reference without a position"))? as usize;
            let object = self
                .stack
                .get(position)
                .ok_or_else(|| corrupt(&format!("back reference {} past end of {} cached objects", position, self.stack.len())))?;
            return Ok(Node::Object(object.clone()));
        }

        let object = SharedObject::new(PlainObject::new(tag, Fields::new()));
        self.stack.push(object.clone());

        let mut fields = Fields::new();
        for (name, value) in document.iter().filter(|(k, _)| !is_envelope_key(k)) {
            fields.insert(name.clone(), self.read_node(value)?);
        }
        object.write().fields = fields;
        Ok(Node::Object(object))
    }

    fn read_index(&mut self, document: &Map<String, Value>) -> DatabaseResult<Node> {
        let oid = match document.get(OID) {
            Some(Value::String(oid)) => Oid::new(oid.as_str()).map_err(DatabaseError::Storage)?,
            _ => return Err(corrupt("index without an oid")),
        };
        let state = data_value(document)?
            .as_object()
            .ok_or_else(|| corrupt("index state is not an object"))?;

        let name = state
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| corrupt("index without a name"))?
            .to_string();
        let object_type = match self.read_node(state.get("object_type").unwrap_or(&Value::Null))? {
            Node::Type(tag) => tag,
            _ => return Err(corrupt("index object type is not a type reference")),
        };
        let attribute = state.get("attribute").and_then(Value::as_str).map(str::to_string);
        let entries = match self.read_node(state.get("entries").unwrap_or(&Value::Null))? {
            Node::Persistent(handle) => handle,
            _ => return Err(corrupt("index entries are not a persistent reference")),
        };

        Ok(Node::Index(Index::from_parts(oid, name, object_type, attribute, entries)))
    }
}

fn is_envelope_key(key: &str) -> bool {
    key.starts_with("@renku_")
}

fn data_value(document: &Map<String, Value>) -> DatabaseResult<&Value> {
    document.get(DATA_VALUE).ok_or_else(|| corrupt("missing data value"))
}

fn corrupt(reason: &str) -> DatabaseError {
    DatabaseError::CorruptData(reason.to_string())
}
