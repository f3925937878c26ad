//! The project singleton.

use chrono::{DateTime, FixedOffset, Utc};

use crate::codec::{Fields, Node, SharedObject, TypeTag};
use crate::db::DatabaseResult;
use crate::model::fields::{read_plain, FieldReader};
use crate::model::Persistable;

pub const PROJECT: TypeTag = TypeTag::new("renku.domain_model.project.Project");
pub const ANNOTATION: TypeTag = TypeTag::new("renku.domain_model.provenance.annotation.Annotation");
pub const TEMPLATE_METADATA: TypeTag = TypeTag::new("renku.domain_model.project.ProjectTemplateMetadata");

/// current metadata schema version
pub const METADATA_VERSION: &str = "10";

/// Free-form metadata attached by a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub id: String,
    pub source: String,
    /// JSON-encoded body
    pub body: String,
}

impl Annotation {
    pub fn to_node(&self) -> Node {
        let mut fields = Fields::new();
        fields.insert("id".into(), Node::from(self.id.as_str()));
        fields.insert("source".into(), Node::from(self.source.as_str()));
        fields.insert("body".into(), Node::from(self.body.as_str()));
        Node::object(ANNOTATION, fields)
    }

    pub fn from_object(object: &SharedObject) -> DatabaseResult<Self> {
        read_plain(object, |r| {
            Ok(Self {
                id: r.string("id")?,
                source: r.string("source")?,
                body: r.string("body")?,
            })
        })
    }
}

/// The template a project was created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMetadata {
    pub source: Option<String>,
    pub reference: Option<String>,
    pub id: Option<String>,
    pub version: Option<String>,
}

impl TemplateMetadata {
    pub fn to_node(&self) -> Node {
        let mut fields = Fields::new();
        fields.insert("template_source".into(), Node::opt_str(self.source.as_deref()));
        fields.insert("template_ref".into(), Node::opt_str(self.reference.as_deref()));
        fields.insert("template_id".into(), Node::opt_str(self.id.as_deref()));
        fields.insert("template_version".into(), Node::opt_str(self.version.as_deref()));
        Node::object(TEMPLATE_METADATA, fields)
    }

    pub fn from_object(object: &SharedObject) -> DatabaseResult<Self> {
        read_plain(object, |r| {
            Ok(Self {
                source: r.opt_string("template_source")?,
                reference: r.opt_string("template_ref")?,
                id: r.opt_string("template_id")?,
                version: r.opt_string("template_version")?,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub annotations: Vec<Annotation>,
    /// metadata schema version, numeric
    pub version: String,
    pub agent_version: Option<String>,
    pub date_created: DateTime<FixedOffset>,
    pub template: Option<TemplateMetadata>,
}

impl Project {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            id: format!("/projects/{}/{}", namespace, name),
            name: name.to_string(),
            description: None,
            keywords: Vec::new(),
            annotations: Vec::new(),
            version: METADATA_VERSION.to_string(),
            agent_version: Some(concat!("provstore ", env!("CARGO_PKG_VERSION")).to_string()),
            date_created: Utc::now().fixed_offset(),
            template: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_keywords<S: Into<String>>(mut self, keywords: impl IntoIterator<Item = S>) -> Self {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

impl Persistable for Project {
    const TYPE: TypeTag = PROJECT;

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("id".into(), Node::from(self.id.as_str()));
        fields.insert("name".into(), Node::from(self.name.as_str()));
        fields.insert("description".into(), Node::opt_str(self.description.as_deref()));
        fields.insert("keywords".into(), Node::strings(&self.keywords));
        fields.insert(
            "annotations".into(),
            Node::List(self.annotations.iter().map(Annotation::to_node).collect()),
        );
        fields.insert("version".into(), Node::from(self.version.as_str()));
        fields.insert("agent_version".into(), Node::opt_str(self.agent_version.as_deref()));
        fields.insert("date_created".into(), Node::DateTime(self.date_created));
        fields.insert(
            "template_metadata".into(),
            self.template.as_ref().map(TemplateMetadata::to_node).unwrap_or(Node::Null),
        );
        fields
    }

    fn from_fields(fields: &Fields) -> DatabaseResult<Self> {
        let r = FieldReader::new(PROJECT, fields);
        let annotations = r
            .objects("annotations")?
            .iter()
            .map(Annotation::from_object)
            .collect::<DatabaseResult<Vec<_>>>()?;
        let template = match r.opt_object("template_metadata")? {
            Some(object) => Some(TemplateMetadata::from_object(&object)?),
            None => None,
        };

        Ok(Self {
            id: r.string("id")?,
            name: r.string("name")?,
            description: r.opt_string("description")?,
            keywords: r.strings("keywords")?,
            annotations,
            version: r.string("version")?,
            agent_version: r.opt_string("agent_version")?,
            date_created: r.datetime("date_created")?,
            template,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_round_trip() {
        let mut project = Project::new("group", "demo")
            .with_description("a demo")
            .with_keywords(["x", "y"]);
        project.annotations.push(Annotation {
            id: "/annotations/1".into(),
            source: "tool".into(),
            body: "{}".into(),
        });
        project.template = Some(TemplateMetadata {
            source: Some("https://example.com/templates".into()),
            reference: Some("main".into()),
            id: Some("python-minimal".into()),
            version: None,
        });

        let decoded = Project::from_fields(&project.to_fields()).unwrap();
        assert_eq!(decoded, project);
    }
}
