//! Datasets and their files.

use chrono::{DateTime, FixedOffset, Utc};
use ulid::Ulid;

use crate::codec::{Fields, Node, SharedObject, TypeTag};
use crate::db::DatabaseResult;
use crate::model::fields::{read_plain, FieldReader};
use crate::model::Persistable;

pub const DATASET: TypeTag = TypeTag::new("renku.domain_model.dataset.Dataset");
pub const DATASET_FILE: TypeTag = TypeTag::new("renku.domain_model.dataset.DatasetFile");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFile {
    /// path relative to the project root
    pub entity_path: String,
    pub checksum: String,
    pub date_added: DateTime<FixedOffset>,
}

impl DatasetFile {
    pub fn new(entity_path: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            entity_path: entity_path.into(),
            checksum: checksum.into(),
            date_added: Utc::now().fixed_offset(),
        }
    }

    fn to_node(&self) -> Node {
        let mut fields = Fields::new();
        fields.insert("entity_path".into(), Node::from(self.entity_path.as_str()));
        fields.insert("checksum".into(), Node::from(self.checksum.as_str()));
        fields.insert("date_added".into(), Node::DateTime(self.date_added));
        Node::object(DATASET_FILE, fields)
    }

    fn from_object(object: &SharedObject) -> DatabaseResult<Self> {
        read_plain(object, |r| {
            Ok(Self {
                entity_path: r.string("entity_path")?,
                checksum: r.string("checksum")?,
                date_added: r.datetime("date_added")?,
            })
        })
    }
}

/// A versioned dataset.
///
/// Every edit produces a new dataset through [`Dataset::derive`], which gets a
/// fresh id and points back at its predecessor.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub id: String,
    /// slug, unique within a project
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    /// id of the dataset this one was derived from
    pub derived_from: Option<String>,
    /// id of the first version
    pub initial_identifier: String,
    pub date_created: DateTime<FixedOffset>,
    pub date_modified: DateTime<FixedOffset>,
    pub files: Vec<DatasetFile>,
}

pub(crate) fn new_identifier() -> String {
    Ulid::new().to_string().to_lowercase()
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        let identifier = new_identifier();
        let now = Utc::now().fixed_offset();
        Self {
            id: format!("/datasets/{}", identifier),
            name: name.into(),
            title: None,
            description: None,
            keywords: Vec::new(),
            derived_from: None,
            initial_identifier: identifier,
            date_created: now,
            date_modified: now,
            files: Vec::new(),
        }
    }

    /// a new version of this dataset
    pub fn derive(&self) -> Self {
        Self {
            id: format!("/datasets/{}", new_identifier()),
            derived_from: Some(self.id.clone()),
            date_modified: Utc::now().fixed_offset(),
            ..self.clone()
        }
    }
}

impl Persistable for Dataset {
    const TYPE: TypeTag = DATASET;

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("id".into(), Node::from(self.id.as_str()));
        fields.insert("name".into(), Node::from(self.name.as_str()));
        fields.insert("title".into(), Node::opt_str(self.title.as_deref()));
        fields.insert("description".into(), Node::opt_str(self.description.as_deref()));
        fields.insert("keywords".into(), Node::strings(&self.keywords));
        fields.insert("derived_from".into(), Node::opt_str(self.derived_from.as_deref()));
        fields.insert("initial_identifier".into(), Node::from(self.initial_identifier.as_str()));
        fields.insert("date_created".into(), Node::DateTime(self.date_created));
        fields.insert("date_modified".into(), Node::DateTime(self.date_modified));
        fields.insert(
            "dataset_files".into(),
            Node::List(self.files.iter().map(DatasetFile::to_node).collect()),
        );
        fields
    }

    fn from_fields(fields: &Fields) -> DatabaseResult<Self> {
        let r = FieldReader::new(DATASET, fields);
        let files = r
            .objects("dataset_files")?
            .iter()
            .map(DatasetFile::from_object)
            .collect::<DatabaseResult<Vec<_>>>()?;

        Ok(Self {
            id: r.string("id")?,
            name: r.string("name")?,
            title: r.opt_string("title")?,
            description: r.opt_string("description")?,
            keywords: r.strings("keywords")?,
            derived_from: r.opt_string("derived_from")?,
            initial_identifier: r.string("initial_identifier")?,
            date_created: r.datetime("date_created")?,
            date_modified: r.datetime("date_modified")?,
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive() {
        let mut d0 = Dataset::new("my-data");
        d0.files.push(DatasetFile::new("data/my-data/a.csv", "abc123"));
        let d1 = d0.derive();

        assert_ne!(d1.id, d0.id);
        assert_eq!(d1.derived_from.as_deref(), Some(d0.id.as_str()));
        assert_eq!(d1.initial_identifier, d0.initial_identifier);
        assert_eq!(d1.name, d0.name);
        assert_eq!(d1.files, d0.files);
    }

    #[test]
    fn test_fields_round_trip() {
        let mut dataset = Dataset::new("my-data");
        dataset.keywords = vec!["a".into()];
        dataset.files.push(DatasetFile::new("data/my-data/a.csv", "abc123"));
        let decoded = Dataset::from_fields(&dataset.to_fields()).unwrap();
        assert_eq!(decoded, dataset);
    }
}
