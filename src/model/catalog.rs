//! Relation catalog over activities.
//!
//! Each indexed token (an activity id) has a set of values per relation
//! name. The catalog keeps three maps in sync:
//!
//! - `name_to_mapping`: relation -> value -> tokens
//! - `token_to_values`: token -> relation -> values
//! - `empty`: relation -> tokens that have no value for it
//!
//! It is derived data and can always be rebuilt from the activities.

use std::collections::{BTreeMap, BTreeSet};

use crate::codec::{Fields, Node, TypeTag};
use crate::db::{Database, DatabaseError, DatabaseResult};
use crate::model::activity::Activity;
use crate::model::Persistable;

pub const CATALOG: TypeTag = TypeTag::new("zc.relation.catalog.Catalog");

type Mapping = BTreeMap<String, BTreeMap<String, BTreeSet<String>>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub name_to_mapping: Mapping,
    pub token_to_values: Mapping,
    pub empty: BTreeMap<String, BTreeSet<String>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// (re)index a token with its relation values
    pub fn index(&mut self, token: &str, relations: BTreeMap<String, Vec<String>>) {
        self.unindex(token);

        let mut values_by_name = BTreeMap::new();
        for (name, values) in relations {
            if values.is_empty() {
                self.empty.entry(name).or_default().insert(token.to_string());
                continue;
            }
            let mapping = self.name_to_mapping.entry(name.clone()).or_default();
            for value in &values {
                mapping.entry(value.clone()).or_default().insert(token.to_string());
            }
            values_by_name.insert(name, values.into_iter().collect::<BTreeSet<_>>());
        }
        self.token_to_values.insert(token.to_string(), values_by_name);
    }

    /// drop a token from every map; unknown tokens are ignored
    pub fn unindex(&mut self, token: &str) {
        if let Some(values_by_name) = self.token_to_values.remove(token) {
            for (name, values) in values_by_name {
                let Some(mapping) = self.name_to_mapping.get_mut(&name) else { continue };
                for value in values {
                    if let Some(tokens) = mapping.get_mut(&value) {
                        tokens.remove(token);
                        if tokens.is_empty() {
                            mapping.remove(&value);
                        }
                    }
                }
                if mapping.is_empty() {
                    self.name_to_mapping.remove(&name);
                }
            }
        }
        self.empty.retain(|_, tokens| {
            tokens.remove(token);
            !tokens.is_empty()
        });
    }

    /// tokens whose relation `name` includes `value`
    pub fn find(&self, name: &str, value: &str) -> Vec<String> {
        self.name_to_mapping
            .get(name)
            .and_then(|mapping| mapping.get(value))
            .map(|tokens| tokens.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// tokens with no value for relation `name`
    pub fn find_empty(&self, name: &str) -> Vec<String> {
        self.empty
            .get(name)
            .map(|tokens| tokens.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.token_to_values.contains_key(token)
    }

    /// index an activity by its plan, usages and generations
    ///
    /// the plan is keyed by its domain id, so a ghost plan is loaded first
    pub fn index_activity(&mut self, db: &Database, activity: &Activity) -> DatabaseResult<()> {
        db.materialize(&activity.plan)?;
        let plan = activity
            .plan
            .domain_id()
            .or_else(|| activity.plan.oid().map(|oid| oid.to_string()));

        let mut relations = BTreeMap::new();
        relations.insert("plan".to_string(), plan.into_iter().collect());
        relations.insert("usages".to_string(), activity.usages.clone());
        relations.insert("generations".to_string(), activity.generations.clone());
        self.index(&activity.id, relations);
        Ok(())
    }
}

fn mapping_to_node(mapping: &Mapping) -> Node {
    Node::Map(
        mapping
            .iter()
            .map(|(outer, inner)| {
                let inner = inner
                    .iter()
                    .map(|(key, set)| (key.clone(), Node::string_set(set)))
                    .collect();
                (outer.clone(), Node::Map(inner))
            })
            .collect(),
    )
}

fn string_set(node: &Node, field: &str) -> DatabaseResult<BTreeSet<String>> {
    let items = match node {
        Node::Set { items, .. } | Node::List(items) => items,
        other => return Err(invalid(field, other)),
    };
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(|| invalid(field, item)))
        .collect()
}

fn mapping_from_node(node: Option<&Node>, field: &str) -> DatabaseResult<Mapping> {
    let mut mapping = Mapping::new();
    let Some(node) = node else { return Ok(mapping) };
    let Node::Map(outer) = node else { return Err(invalid(field, node)) };
    for (key, inner) in outer {
        let Node::Map(inner) = inner else { return Err(invalid(field, inner)) };
        let mut values = BTreeMap::new();
        for (inner_key, set) in inner {
            values.insert(inner_key.clone(), string_set(set, field)?);
        }
        mapping.insert(key.clone(), values);
    }
    Ok(mapping)
}

fn invalid(field: &str, found: &Node) -> DatabaseError {
    DatabaseError::InvalidField {
        field: format!("{}.{}", CATALOG.name(), field),
        reason: format!("unexpected {}", found.kind_name()),
    }
}

impl Persistable for Catalog {
    const TYPE: TypeTag = CATALOG;

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("name_to_mapping".into(), mapping_to_node(&self.name_to_mapping));
        fields.insert("token_to_values".into(), mapping_to_node(&self.token_to_values));
        fields.insert(
            "empty".into(),
            Node::Map(
                self.empty
                    .iter()
                    .map(|(name, tokens)| (name.clone(), Node::string_set(tokens)))
                    .collect(),
            ),
        );
        fields
    }

    fn from_fields(fields: &Fields) -> DatabaseResult<Self> {
        let mut empty = BTreeMap::new();
        match fields.get("empty") {
            Some(Node::Map(map)) => {
                for (name, tokens) in map {
                    empty.insert(name.clone(), string_set(tokens, "empty")?);
                }
            }
            Some(other) if !other.is_null() => return Err(invalid("empty", other)),
            _ => {}
        }

        Ok(Self {
            name_to_mapping: mapping_from_node(fields.get("name_to_mapping"), "name_to_mapping")?,
            token_to_values: mapping_from_node(fields.get("token_to_values"), "token_to_values")?,
            empty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relations(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(name, values)| (name.to_string(), values.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_index_and_find() {
        let mut catalog = Catalog::new();
        catalog.index("a1", relations(&[("usages", &["in.csv"]), ("generations", &["out.csv"])]));
        catalog.index("a2", relations(&[("usages", &["out.csv"]), ("generations", &[])]));

        assert_eq!(catalog.find("usages", "out.csv"), vec!["a2"]);
        assert_eq!(catalog.find("generations", "out.csv"), vec!["a1"]);
        assert_eq!(catalog.find_empty("generations"), vec!["a2"]);
        assert!(catalog.find("usages", "nothing").is_empty());
    }

    #[test]
    fn test_reindex_replaces_values() {
        let mut catalog = Catalog::new();
        catalog.index("a1", relations(&[("usages", &["old.csv"])]));
        catalog.index("a1", relations(&[("usages", &["new.csv"])]));

        assert!(catalog.find("usages", "old.csv").is_empty());
        assert_eq!(catalog.find("usages", "new.csv"), vec!["a1"]);
    }

    #[test]
    fn test_unindex() {
        let mut catalog = Catalog::new();
        catalog.index("a1", relations(&[("usages", &["in.csv"]), ("generations", &[])]));
        catalog.unindex("a1");
        catalog.unindex("never-indexed");

        assert_eq!(catalog, Catalog::new());
    }

    #[test]
    fn test_fields_round_trip() {
        let mut catalog = Catalog::new();
        catalog.index("a1", relations(&[("usages", &["in.csv", "@odd"]), ("generations", &[])]));
        let decoded = Catalog::from_fields(&catalog.to_fields()).unwrap();
        assert_eq!(decoded, catalog);
    }
}
