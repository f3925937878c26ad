//! Workflow plans.

use chrono::{DateTime, FixedOffset, Utc};

use crate::codec::{Fields, Node, TypeTag};
use crate::db::DatabaseResult;
use crate::model::dataset::new_identifier;
use crate::model::fields::FieldReader;
use crate::model::Persistable;

pub const PLAN: TypeTag = TypeTag::new("renku.domain_model.workflow.plan.Plan");

/// A recorded command template.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub command: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub derived_from: Option<String>,
    pub date_created: DateTime<FixedOffset>,
}

impl Plan {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: format!("/plans/{}", new_identifier()),
            name: name.into(),
            command: command.into(),
            description: None,
            keywords: Vec::new(),
            derived_from: None,
            date_created: Utc::now().fixed_offset(),
        }
    }

    /// a modified copy that supersedes this plan
    pub fn derive(&self) -> Self {
        Self {
            id: format!("/plans/{}", new_identifier()),
            derived_from: Some(self.id.clone()),
            date_created: Utc::now().fixed_offset(),
            ..self.clone()
        }
    }
}

impl Persistable for Plan {
    const TYPE: TypeTag = PLAN;

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("id".into(), Node::from(self.id.as_str()));
        fields.insert("name".into(), Node::from(self.name.as_str()));
        fields.insert("command".into(), Node::from(self.command.as_str()));
        fields.insert("description".into(), Node::opt_str(self.description.as_deref()));
        fields.insert("keywords".into(), Node::strings(&self.keywords));
        fields.insert("derived_from".into(), Node::opt_str(self.derived_from.as_deref()));
        fields.insert("date_created".into(), Node::DateTime(self.date_created));
        fields
    }

    fn from_fields(fields: &Fields) -> DatabaseResult<Self> {
        let r = FieldReader::new(PLAN, fields);
        Ok(Self {
            id: r.string("id")?,
            name: r.string("name")?,
            command: r.string("command")?,
            description: r.opt_string("description")?,
            keywords: r.strings("keywords")?,
            derived_from: r.opt_string("derived_from")?,
            date_created: r.datetime("date_created")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_keeps_name() {
        let plan = Plan::new("train", "python train.py");
        let derived = plan.derive();
        assert_eq!(derived.name, "train");
        assert_eq!(derived.derived_from.as_deref(), Some(plan.id.as_str()));
        assert!(derived.id.starts_with("/plans/"));
    }
}
