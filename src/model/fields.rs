//! Typed access to object fields.

use chrono::{DateTime, FixedOffset};

use crate::codec::{Fields, Node, SharedObject, TypeTag};
use crate::db::{DatabaseError, DatabaseResult, ObjectHandle};

/// Reads typed values out of a field map, reporting errors against the
/// owning type.
pub(crate) struct FieldReader<'a> {
    type_tag: TypeTag,
    fields: &'a Fields,
}

impl<'a> FieldReader<'a> {
    pub fn new(type_tag: TypeTag, fields: &'a Fields) -> Self {
        Self { type_tag, fields }
    }

    /// present and not null
    fn get(&self, name: &str) -> Option<&'a Node> {
        self.fields.get(name).filter(|node| !node.is_null())
    }

    fn require(&self, name: &str) -> DatabaseResult<&'a Node> {
        self.get(name).ok_or_else(|| DatabaseError::MissingField {
            type_name: self.type_tag.name().to_string(),
            field: name.to_string(),
        })
    }

    fn invalid(&self, name: &str, expected: &str, found: &Node) -> DatabaseError {
        DatabaseError::InvalidField {
            field: format!("{}.{}", self.type_tag.name(), name),
            reason: format!("expected {}, found {}", expected, found.kind_name()),
        }
    }

    pub fn string(&self, name: &str) -> DatabaseResult<String> {
        let node = self.require(name)?;
        node.as_str().map(str::to_string).ok_or_else(|| self.invalid(name, "str", node))
    }

    pub fn opt_string(&self, name: &str) -> DatabaseResult<Option<String>> {
        match self.get(name) {
            Some(node) => node
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| self.invalid(name, "str", node)),
            None => Ok(None),
        }
    }

    /// a list or set of strings; absent means empty
    pub fn strings(&self, name: &str) -> DatabaseResult<Vec<String>> {
        self.nodes(name)?
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(|| self.invalid(name, "str", item)))
            .collect()
    }

    /// items of a list or set; absent means empty
    pub fn nodes(&self, name: &str) -> DatabaseResult<Vec<Node>> {
        match self.get(name) {
            Some(Node::List(items)) | Some(Node::Set { items, .. }) => Ok(items.clone()),
            Some(other) => Err(self.invalid(name, "list", other)),
            None => Ok(Vec::new()),
        }
    }

    pub fn datetime(&self, name: &str) -> DatabaseResult<DateTime<FixedOffset>> {
        match self.require(name)? {
            Node::DateTime(dt) => Ok(*dt),
            other => Err(self.invalid(name, "datetime", other)),
        }
    }

    pub fn opt_datetime(&self, name: &str) -> DatabaseResult<Option<DateTime<FixedOffset>>> {
        match self.get(name) {
            Some(Node::DateTime(dt)) => Ok(Some(*dt)),
            Some(other) => Err(self.invalid(name, "datetime", other)),
            None => Ok(None),
        }
    }

    pub fn persistent(&self, name: &str) -> DatabaseResult<ObjectHandle> {
        let node = self.require(name)?;
        node.as_persistent().cloned().ok_or_else(|| self.invalid(name, "persistent object", node))
    }

    pub fn opt_object(&self, name: &str) -> DatabaseResult<Option<SharedObject>> {
        match self.get(name) {
            Some(Node::Object(object)) => Ok(Some(object.clone())),
            Some(other) => Err(self.invalid(name, "object", other)),
            None => Ok(None),
        }
    }

    /// plain objects of a list field
    pub fn objects(&self, name: &str) -> DatabaseResult<Vec<SharedObject>> {
        self.nodes(name)?
            .iter()
            .map(|item| item.as_object().cloned().ok_or_else(|| self.invalid(name, "object", item)))
            .collect()
    }
}

/// reads the fields of a plain object
pub(crate) fn read_plain<T>(
    object: &SharedObject,
    f: impl FnOnce(FieldReader<'_>) -> DatabaseResult<T>,
) -> DatabaseResult<T> {
    let guard = object.read();
    f(FieldReader::new(guard.type_tag, &guard.fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: TypeTag = TypeTag::new("tests.T");

    #[test]
    fn test_missing_and_invalid() {
        let mut fields = Fields::new();
        fields.insert("name".into(), Node::Int(1));
        fields.insert("gone".into(), Node::Null);
        let reader = FieldReader::new(T, &fields);

        assert!(matches!(reader.string("name"), Err(DatabaseError::InvalidField { .. })));
        assert!(matches!(reader.string("gone"), Err(DatabaseError::MissingField { .. })));
        assert_eq!(reader.opt_string("gone").unwrap(), None);
        assert!(reader.strings("absent").unwrap().is_empty());
    }

    #[test]
    fn test_strings_from_set() {
        let mut fields = Fields::new();
        fields.insert("keywords".into(), Node::string_set(["a", "b"]));
        let reader = FieldReader::new(T, &fields);
        assert_eq!(reader.strings("keywords").unwrap(), vec!["a", "b"]);
    }
}
