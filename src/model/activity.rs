//! Executions of plans.

use chrono::{DateTime, FixedOffset};

use crate::codec::{Fields, Node, TypeTag};
use crate::db::{DatabaseResult, ObjectHandle};
use crate::model::dataset::new_identifier;
use crate::model::fields::FieldReader;
use crate::model::Persistable;

/// Activities are frozen once loaded, history is not edited in place.
pub const ACTIVITY: TypeTag = TypeTag::new("renku.domain_model.provenance.activity.Activity");

/// One execution of a plan.
#[derive(Debug, Clone)]
pub struct Activity {
    pub id: String,
    /// the executed plan
    pub plan: ObjectHandle,
    pub started_at: DateTime<FixedOffset>,
    pub ended_at: DateTime<FixedOffset>,
    /// paths read by the execution
    pub usages: Vec<String>,
    /// paths written by the execution
    pub generations: Vec<String>,
}

impl Activity {
    pub fn new(plan: ObjectHandle, started_at: DateTime<FixedOffset>, ended_at: DateTime<FixedOffset>) -> Self {
        Self {
            id: format!("/activities/{}", new_identifier()),
            plan,
            started_at,
            ended_at,
            usages: Vec::new(),
            generations: Vec::new(),
        }
    }
}

impl Persistable for Activity {
    const TYPE: TypeTag = ACTIVITY;

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("id".into(), Node::from(self.id.as_str()));
        fields.insert("association".into(), Node::Persistent(self.plan.clone()));
        fields.insert("started_at_time".into(), Node::DateTime(self.started_at));
        fields.insert("ended_at_time".into(), Node::DateTime(self.ended_at));
        fields.insert("usages".into(), Node::strings(&self.usages));
        fields.insert("generations".into(), Node::strings(&self.generations));
        fields
    }

    fn from_fields(fields: &Fields) -> DatabaseResult<Self> {
        let r = FieldReader::new(ACTIVITY, fields);
        Ok(Self {
            id: r.string("id")?,
            plan: r.persistent("association")?,
            started_at: r.datetime("started_at_time")?,
            ended_at: r.datetime("ended_at_time")?,
            usages: r.strings("usages")?,
            generations: r.strings("generations")?,
        })
    }
}
