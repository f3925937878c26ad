//! Field-by-field rendering of two conflicting values.

use std::collections::BTreeSet;
use std::fmt::Write;

use serde_json::{Map, Value};

use crate::codec::{Fields, Node, ObjectWriter};
use crate::db::{Database, DatabaseResult};

/// One side of a conflict: a value and the database it was read from.
#[derive(Clone, Copy)]
pub struct Side<'a> {
    pub node: &'a Node,
    pub database: &'a Database,
}

impl<'a> Side<'a> {
    pub fn new(node: &'a Node, database: &'a Database) -> Self {
        Self { node, database }
    }
}

fn describe(node: &Node) -> String {
    match node {
        Node::Persistent(handle) => match handle.oid() {
            Some(oid) => format!("{} {}", node.kind_name(), oid.short()),
            None => node.kind_name().to_string(),
        },
        Node::Index(index) => format!("index {}", index.name()),
        other => other.kind_name().to_string(),
    }
}

/// the fields of a persistent value, or the value itself under ""
fn render(side: Side<'_>) -> DatabaseResult<Map<String, Value>> {
    let mut writer = ObjectWriter::detached(side.database);
    let fields = match side.node {
        Node::Persistent(handle) => side.database.fields(handle)?,
        other => {
            let mut fields = Fields::new();
            fields.insert(String::new(), other.clone());
            fields
        }
    };
    match writer.serialize_fields(&fields)? {
        Value::Object(map) => Ok(map),
        other => {
            let mut map = Map::new();
            map.insert(String::new(), other);
            Ok(map)
        }
    }
}

/// A unified-diff style listing of the fields that differ.
///
/// Equal fields are left out; a field missing on one side shows only the
/// other side's line.
pub fn structural_diff(local: Side<'_>, remote: Side<'_>) -> DatabaseResult<String> {
    let left = render(local)?;
    let right = render(remote)?;

    let mut out = String::new();
    // writing to a String cannot fail
    let _ = writeln!(out, "--- local {}", describe(local.node));
    let _ = writeln!(out, "+++ remote {}", describe(remote.node));

    let names: BTreeSet<&String> = left.keys().chain(right.keys()).collect();
    for name in names {
        let (l, r) = (left.get(name), right.get(name));
        if l == r {
            continue;
        }
        let label = if name.is_empty() { String::new() } else { format!("{}: ", name) };
        if let Some(value) = l {
            let _ = writeln!(out, "- {}{}", label, value);
        }
        if let Some(value) = r {
            let _ = writeln!(out, "+ {}{}", label, value);
        }
    }
    Ok(out)
}
