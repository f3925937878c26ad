//! Keyed, sorted views over collections of persistent objects.
//!
//! An index is inlined in its parent (usually the root) but keeps its own
//! oid. Its entries live in a separate B-tree object, so adding an entry only
//! rewrites that B-tree and not the parent.

use std::ops::Bound;

use crate::codec::{registry, Fields, Node, TypeTag};
use crate::db::database::Database;
use crate::db::error::{DatabaseError, DatabaseResult};
use crate::db::object::ObjectHandle;
use crate::storage::Oid;

/// Inclusive or exclusive bounds for key iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub min: Option<String>,
    pub max: Option<String>,
    pub exclude_min: bool,
    pub exclude_max: bool,
}

impl KeyRange {
    /// every key
    pub fn all() -> Self {
        Self::default()
    }

    pub fn min(mut self, key: impl Into<String>) -> Self {
        self.min = Some(key.into());
        self
    }

    pub fn max(mut self, key: impl Into<String>) -> Self {
        self.max = Some(key.into());
        self
    }

    pub fn excluding_min(mut self) -> Self {
        self.exclude_min = true;
        self
    }

    pub fn excluding_max(mut self) -> Self {
        self.exclude_max = true;
        self
    }

    /// keys starting with `prefix`
    pub fn prefix(prefix: &str) -> Self {
        let range = Self::all().min(prefix);
        match prefix_upper_bound(prefix) {
            Some(upper) => range.max(upper).excluding_max(),
            None => range,
        }
    }

    fn bounds(&self) -> Option<(Bound<&str>, Bound<&str>)> {
        if let (Some(min), Some(max)) = (&self.min, &self.max) {
            // BTreeMap::range panics on inverted or empty exclusive ranges
            if min > max || (min == max && (self.exclude_min || self.exclude_max)) {
                return None;
            }
        }
        let lower = match &self.min {
            Some(min) if self.exclude_min => Bound::Excluded(min.as_str()),
            Some(min) => Bound::Included(min.as_str()),
            None => Bound::Unbounded,
        };
        let upper = match &self.max {
            Some(max) if self.exclude_max => Bound::Excluded(max.as_str()),
            Some(max) => Bound::Included(max.as_str()),
            None => Bound::Unbounded,
        };
        Some((lower, upper))
    }
}

/// smallest string greater than every string with this prefix
fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        // the surrogate range is not a char
        let next = match last {
            '\u{D7FF}' => Some('\u{E000}'),
            _ => char::from_u32(last as u32 + 1),
        };
        if let Some(next) = next {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

/// A named, keyed collection of objects of one type.
#[derive(Debug, Clone)]
pub struct Index {
    oid: Oid,
    name: String,
    object_type: TypeTag,
    /// dotted attribute path the key is derived from
    attribute: Option<String>,
    entries: ObjectHandle,
}

impl Index {
    pub fn new(name: impl Into<String>, object_type: TypeTag, attribute: Option<&str>) -> Self {
        Self {
            oid: Oid::generate(),
            name: name.into(),
            object_type,
            attribute: attribute.map(str::to_string),
            entries: ObjectHandle::new(registry::BTREE, Fields::new()),
        }
    }

    pub(crate) fn from_parts(
        oid: Oid,
        name: String,
        object_type: TypeTag,
        attribute: Option<String>,
        entries: ObjectHandle,
    ) -> Self {
        Self {
            oid,
            name,
            object_type,
            attribute,
            entries,
        }
    }

    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object_type(&self) -> TypeTag {
        self.object_type
    }

    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// the B-tree holding key -> object entries
    pub fn entries(&self) -> &ObjectHandle {
        &self.entries
    }

    /// derive the key for an object from the index attribute
    ///
    /// `key_object` is used instead of `object` when given, for entries keyed
    /// by an attribute of a related object
    pub fn generate_key(
        &self,
        db: &Database,
        object: &ObjectHandle,
        key_object: Option<&ObjectHandle>,
    ) -> DatabaseResult<String> {
        let attribute = self.attribute.as_deref().ok_or(DatabaseError::MissingKey)?;
        let source = key_object.unwrap_or(object);

        let mut current = Node::Persistent(source.clone());
        for part in attribute.split('.') {
            let type_name = current.kind_name();
            let next = match &current {
                Node::Persistent(handle) => {
                    db.materialize(handle)?;
                    handle.field(part)?
                }
                Node::Object(object) => object.field(part),
                Node::Map(map) => map.get(part).cloned(),
                _ => None,
            };
            current = next.ok_or_else(|| DatabaseError::MissingField {
                type_name: type_name.to_string(),
                field: part.to_string(),
            })?;
        }

        match current {
            Node::Str(key) => Ok(key),
            Node::Int(key) => Ok(key.to_string()),
            other => Err(DatabaseError::InvalidField {
                field: attribute.to_string(),
                reason: format!("cannot use a {} as an index key", other.kind_name()),
            }),
        }
    }

    fn resolve_key(
        &self,
        db: &Database,
        object: &ObjectHandle,
        key: Option<&str>,
        key_object: Option<&ObjectHandle>,
    ) -> DatabaseResult<String> {
        match (&self.attribute, key) {
            (Some(_), Some(given)) => {
                let derived = self.generate_key(db, object, key_object)?;
                if derived != given {
                    return Err(DatabaseError::IndexKeyMismatch {
                        expected: derived,
                        given: given.to_string(),
                    });
                }
                Ok(derived)
            }
            (Some(_), None) => self.generate_key(db, object, key_object),
            (None, Some(given)) => Ok(given.to_string()),
            (None, None) => Err(DatabaseError::MissingKey),
        }
    }

    /// add an object, returning the key it was stored under
    pub fn add(
        &self,
        db: &Database,
        object: &ObjectHandle,
        key: Option<&str>,
        key_object: Option<&ObjectHandle>,
    ) -> DatabaseResult<String> {
        db.materialize(object)?;
        match object.type_tag() {
            Some(tag) if tag == self.object_type => {}
            other => {
                return Err(DatabaseError::TypeMismatch {
                    expected: self.object_type.name().to_string(),
                    found: other.map(|t| t.name()).unwrap_or("unknown").to_string(),
                });
            }
        }

        let key = self.resolve_key(db, object, key, key_object)?;
        db.materialize(&self.entries)?;
        self.entries.set_field(key.clone(), Node::Persistent(object.clone()))?;
        tracing::trace!(index = %self.name, key = %key, "added index entry");
        Ok(key)
    }

    pub fn remove(&self, db: &Database, object: &ObjectHandle, key: Option<&str>) -> DatabaseResult<()> {
        let key = self.resolve_key(db, object, key, None)?;
        db.materialize(&self.entries)?;
        if self.entries.field(&key)?.is_none() {
            return Err(DatabaseError::KeyNotFound(key));
        }
        self.entries.remove_field(&key)?;
        Ok(())
    }

    /// look up an entry, loading it
    pub fn get(&self, db: &Database, key: &str) -> DatabaseResult<Option<ObjectHandle>> {
        db.materialize(&self.entries)?;
        match self.entries.field(key)? {
            Some(Node::Persistent(object)) => {
                db.materialize(&object)?;
                Ok(Some(object))
            }
            Some(other) => Err(DatabaseError::CorruptData(format!(
                "index '{}' entry '{}' is a {}",
                self.name,
                key,
                other.kind_name()
            ))),
            None => Ok(None),
        }
    }

    pub fn contains(&self, db: &Database, key: &str) -> DatabaseResult<bool> {
        db.materialize(&self.entries)?;
        Ok(self.entries.field(key)?.is_some())
    }

    pub fn len(&self, db: &Database) -> DatabaseResult<usize> {
        db.materialize(&self.entries)?;
        self.entries.with_fields(|fields| fields.len())
    }

    pub fn is_empty(&self, db: &Database) -> DatabaseResult<bool> {
        Ok(self.len(db)? == 0)
    }

    /// entries in key order within the range; values are not loaded
    pub fn items(&self, db: &Database, range: &KeyRange) -> DatabaseResult<Vec<(String, ObjectHandle)>> {
        db.materialize(&self.entries)?;
        let Some(bounds) = range.bounds() else {
            return Ok(Vec::new());
        };
        self.entries.with_fields(|fields| {
            fields
                .range::<str, _>(bounds)
                .filter_map(|(key, node)| node.as_persistent().map(|object| (key.clone(), object.clone())))
                .collect()
        })
    }

    pub fn keys(&self, db: &Database, range: &KeyRange) -> DatabaseResult<Vec<String>> {
        Ok(self.items(db, range)?.into_iter().map(|(key, _)| key).collect())
    }

    pub fn values(&self, db: &Database, range: &KeyRange) -> DatabaseResult<Vec<ObjectHandle>> {
        Ok(self.items(db, range)?.into_iter().map(|(_, object)| object).collect())
    }
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}
