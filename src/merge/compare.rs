//! Settling conflicts without asking.
//!
//! Two values that claim the same slot are not a real conflict when they
//! are the same object, share a domain id, or when one is a later version
//! of the other. Lists are append-only in practice and get unioned.

use std::collections::HashSet;

use crate::codec::Node;
use crate::db::{Database, DatabaseResult, ObjectHandle};
use crate::merge::diff::Side;

/// field holding the id of the version an object was derived from
const DERIVED_FROM: &str = "derived_from";

/// The outcome of an automatic comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Local,
    Remote,
    Merged(Node),
}

/// decide a conflict between two values, or `None` if a person has to
pub fn compare_objects(local: Side<'_>, remote: Side<'_>) -> DatabaseResult<Option<Resolution>> {
    if local.node == remote.node {
        return Ok(Some(Resolution::Local));
    }

    match (local.node, remote.node) {
        (Node::Persistent(l), Node::Persistent(r)) => compare_persistent(l, local.database, r, remote.database),
        (Node::Index(l), Node::Index(r)) if l.oid() == r.oid() => Ok(Some(Resolution::Local)),
        (Node::List(l), Node::List(r)) => {
            let mut merged = l.clone();
            for item in r {
                if !merged.contains(item) {
                    merged.push(item.clone());
                }
            }
            Ok(Some(Resolution::Merged(Node::List(merged))))
        }
        _ => Ok(None),
    }
}

fn compare_persistent(
    local: &ObjectHandle,
    local_db: &Database,
    remote: &ObjectHandle,
    remote_db: &Database,
) -> DatabaseResult<Option<Resolution>> {
    if local.oid().is_some() && local.oid() == remote.oid() {
        return Ok(Some(Resolution::Local));
    }

    local_db.materialize(local)?;
    remote_db.materialize(remote)?;
    let (Some(local_id), Some(remote_id)) = (local.domain_id(), remote.domain_id()) else {
        return Ok(None);
    };
    if local_id == remote_id {
        return Ok(Some(Resolution::Local));
    }

    let derivable = match (local.type_tag(), remote.type_tag()) {
        (Some(l), Some(r)) if l == r => local_db.registry().spec(l)?.derivable,
        _ => false,
    };
    if !derivable {
        return Ok(None);
    }

    // ancestors live in the database of the side that derived them
    if derives_from(local, local_db, &remote_id)? {
        tracing::debug!(local = %local_id, remote = %remote_id, "local version supersedes remote");
        return Ok(Some(Resolution::Local));
    }
    if derives_from(remote, remote_db, &local_id)? {
        tracing::debug!(local = %local_id, remote = %remote_id, "remote version supersedes local");
        return Ok(Some(Resolution::Remote));
    }
    Ok(None)
}

/// walk `derived_from` links from `object` looking for `ancestor_id`
pub fn derives_from(object: &ObjectHandle, database: &Database, ancestor_id: &str) -> DatabaseResult<bool> {
    let mut visited = HashSet::new();
    let mut current = derived_from(object)?;

    while let Some(id) = current {
        if id == ancestor_id {
            return Ok(true);
        }
        if !visited.insert(id.clone()) {
            return Ok(false);
        }
        current = match database.get_by_id(&id) {
            Ok(parent) => derived_from(&parent)?,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
    }
    Ok(false)
}

fn derived_from(object: &ObjectHandle) -> DatabaseResult<Option<String>> {
    Ok(object
        .field(DERIVED_FROM)?
        .and_then(|node| node.as_str().map(str::to_string)))
}
