//! Type-specific merge strategies.
//!
//! The strategy is picked by the runtime type of the conflicting object:
//!
//! - B-trees and buckets: key-wise union, conflicts settled by comparison
//!   or by asking
//! - tree sets: union of members
//! - the relation catalog: key-wise union that keeps local entries
//! - the project: field-level three-way merge
//!
//! Anything else fails the merge.

use std::collections::{BTreeMap, BTreeSet};

use crate::codec::{Node, TypeKind, TypeTag};
use crate::db::{Database, ObjectHandle};
use crate::merge::compare::{compare_objects, Resolution};
use crate::merge::diff::{structural_diff, Side};
use crate::merge::error::{MergeError, MergeResult};
use crate::merge::prompt::{choose, Prompter};
use crate::model::{Annotation, Catalog, Persistable, Project, TemplateMetadata, CATALOG, PROJECT};

const LOCAL: &str = "l";
const REMOTE: &str = "r";
const ABORT: &str = "a";

/// project fields written back after a project merge
const PROJECT_MERGED_FIELDS: [&str; 6] = [
    "description",
    "keywords",
    "annotations",
    "version",
    "agent_version",
    "template_metadata",
];

/// Merges objects of a remote database into objects of the local one.
///
/// Local objects are updated in place; remote objects are only read.
pub struct ObjectMerger<'a> {
    local_db: &'a Database,
    prompter: &'a mut dyn Prompter,
}

impl<'a> ObjectMerger<'a> {
    pub fn new(local_db: &'a Database, prompter: &'a mut dyn Prompter) -> Self {
        Self { local_db, prompter }
    }

    /// merge two values that sit in the same slot
    pub fn merge_values(
        &mut self,
        local: &Node,
        remote: &Node,
        remote_db: &Database,
        base: Option<&Node>,
    ) -> MergeResult<Node> {
        match (local, remote) {
            (Node::Persistent(l), Node::Persistent(r)) => {
                let base = base.and_then(Node::as_persistent);
                self.merge_objects(l, r, remote_db, base).map(Node::Persistent)
            }
            (Node::Index(l), Node::Index(r)) => {
                self.merge_btrees(l.entries(), r.entries(), remote_db)?;
                Ok(local.clone())
            }
            _ => Err(MergeError::UnsupportedType {
                local: local.kind_name().to_string(),
                remote: remote.kind_name().to_string(),
            }),
        }
    }

    /// merge `remote` into `local` and return the merged object
    pub fn merge_objects(
        &mut self,
        local: &ObjectHandle,
        remote: &ObjectHandle,
        remote_db: &Database,
        base: Option<&ObjectHandle>,
    ) -> MergeResult<ObjectHandle> {
        self.local_db.materialize(local)?;
        remote_db.materialize(remote)?;
        if let Some(base) = base {
            self.local_db.materialize(base)?;
        }

        let tag = type_tag(local)?;
        let remote_tag = type_tag(remote)?;
        if tag != remote_tag {
            return Err(unsupported(tag, remote_tag));
        }

        let kind = self.local_db.registry().spec(tag)?.kind;
        match kind {
            TypeKind::Container => self.merge_btrees(local, remote, remote_db)?,
            TypeKind::TreeSet => merge_tree_sets(local, remote)?,
            TypeKind::Record if tag == CATALOG => self.merge_catalogs(local, remote, remote_db)?,
            TypeKind::Record if tag == PROJECT => self.merge_projects(local, remote, remote_db, base)?,
            _ => return Err(unsupported(tag, remote_tag)),
        }

        tracing::info!(
            type_tag = %tag,
            oid = local.oid().map(|o| o.short().to_string()).unwrap_or_default(),
            "merged object"
        );
        Ok(local.clone())
    }

    fn merge_btrees(&mut self, local: &ObjectHandle, remote: &ObjectHandle, remote_db: &Database) -> MergeResult<()> {
        self.local_db.materialize(local)?;
        remote_db.materialize(remote)?;
        let local_entries = local.fields()?;
        let remote_entries = remote.fields()?;

        let mut changes = Vec::new();
        for (key, remote_value) in &remote_entries {
            let Some(local_value) = local_entries.get(key) else {
                tracing::debug!(key = %key, "taking remote addition");
                changes.push((key.clone(), remote_value.clone()));
                continue;
            };

            let l = Side::new(local_value, self.local_db);
            let r = Side::new(remote_value, remote_db);
            let resolution = match compare_objects(l, r)? {
                Some(resolution) => resolution,
                None => self.ask(key, l, r)?,
            };
            match resolution {
                Resolution::Local => {}
                Resolution::Remote => changes.push((key.clone(), remote_value.clone())),
                Resolution::Merged(node) => changes.push((key.clone(), node)),
            }
        }

        if !changes.is_empty() {
            local.update(|fields| fields.extend(changes))?;
        }
        Ok(())
    }

    fn ask(&mut self, key: &str, local: Side<'_>, remote: Side<'_>) -> MergeResult<Resolution> {
        let diff = structural_diff(local, remote)?;
        let message = format!(
            "Merge conflict for '{}':\n{}Keep [l]ocal, [r]emote or [a]bort?",
            key, diff
        );
        match choose(&mut *self.prompter, &message, &[LOCAL, REMOTE, ABORT], ABORT)?.as_str() {
            LOCAL => Ok(Resolution::Local),
            REMOTE => Ok(Resolution::Remote),
            _ => Err(MergeError::Aborted),
        }
    }

    fn merge_catalogs(&mut self, local: &ObjectHandle, remote: &ObjectHandle, remote_db: &Database) -> MergeResult<()> {
        let mut merged: Catalog = self.local_db.decode(local)?;
        let theirs: Catalog = remote_db.decode(remote)?;

        merge_nested(&mut merged.name_to_mapping, theirs.name_to_mapping);
        merge_nested(&mut merged.token_to_values, theirs.token_to_values);
        for (name, tokens) in theirs.empty {
            merged.empty.entry(name).or_insert(tokens);
        }

        local.replace_fields(merged.to_fields())?;
        Ok(())
    }

    fn merge_projects(
        &mut self,
        local: &ObjectHandle,
        remote: &ObjectHandle,
        remote_db: &Database,
        base: Option<&ObjectHandle>,
    ) -> MergeResult<()> {
        let mut merged: Project = self.local_db.decode(local)?;
        let theirs: Project = remote_db.decode(remote)?;
        let base: Option<Project> = match base {
            Some(base) => Some(self.local_db.decode(base)?),
            None => None,
        };

        merged.keywords = merge_keywords(
            base.as_ref().map(|b| b.keywords.as_slice()),
            &merged.keywords,
            &theirs.keywords,
        );

        merged.description = match three_way(
            base.as_ref().map(|b| &b.description),
            &merged.description,
            &theirs.description,
        ) {
            Some(description) => description,
            None => self.ask_description(&merged.description, &theirs.description)?,
        };

        merged.annotations = match three_way(
            base.as_ref().map(|b| &b.annotations),
            &merged.annotations,
            &theirs.annotations,
        ) {
            Some(annotations) => annotations,
            None => union_annotations(&merged.annotations, &theirs.annotations),
        };

        merged.version = max_version(&merged.version, &theirs.version);
        if let Some(remote_agent) = &theirs.agent_version {
            let newer = match &merged.agent_version {
                Some(local_agent) => dotted_version(remote_agent) > dotted_version(local_agent),
                None => true,
            };
            if newer {
                merged.agent_version = Some(remote_agent.clone());
            }
        }

        merged.template = match three_way(
            base.as_ref().map(|b| &b.template),
            &merged.template,
            &theirs.template,
        ) {
            Some(template) => template,
            None => self.ask_template(&merged.template, &theirs.template)?,
        };

        let mut fields = merged.to_fields();
        local.update(|current| {
            for name in PROJECT_MERGED_FIELDS {
                if let Some(value) = fields.remove(name) {
                    current.insert(name.to_string(), value);
                }
            }
        })?;
        Ok(())
    }

    fn ask_description(&mut self, local: &Option<String>, remote: &Option<String>) -> MergeResult<Option<String>> {
        let local = local.as_deref().unwrap_or_default();
        let message = format!(
            "Project description was changed on both sides.\n  local:  {}\n  remote: {}\nEnter the merged description",
            local,
            remote.as_deref().unwrap_or_default()
        );
        let answer = self.prompter.prompt(&message, local)?;
        Ok(if answer.is_empty() { None } else { Some(answer) })
    }

    fn ask_template(
        &mut self,
        local: &Option<TemplateMetadata>,
        remote: &Option<TemplateMetadata>,
    ) -> MergeResult<Option<TemplateMetadata>> {
        let message = format!(
            "Project template was changed on both sides.\n  local:  {}\n  remote: {}\nKeep [l]ocal, [r]emote or [a]bort?",
            describe_template(local),
            describe_template(remote)
        );
        match choose(&mut *self.prompter, &message, &[LOCAL, REMOTE, ABORT], ABORT)?.as_str() {
            LOCAL => Ok(local.clone()),
            REMOTE => Ok(remote.clone()),
            _ => Err(MergeError::Aborted),
        }
    }
}

fn type_tag(object: &ObjectHandle) -> MergeResult<TypeTag> {
    Ok(object.type_tag().ok_or(crate::db::DatabaseError::Ghost)?)
}

fn unsupported(local: TypeTag, remote: TypeTag) -> MergeError {
    MergeError::UnsupportedType {
        local: local.name().to_string(),
        remote: remote.name().to_string(),
    }
}

fn merge_tree_sets(local: &ObjectHandle, remote: &ObjectHandle) -> MergeResult<()> {
    let members = remote.fields()?;
    local.update(|fields| {
        for member in members.into_keys() {
            fields.entry(member).or_insert(Node::Bool(true));
        }
    })?;
    Ok(())
}

/// add remote entries whose keys are absent locally, one level deep
fn merge_nested<V>(local: &mut BTreeMap<String, BTreeMap<String, V>>, remote: BTreeMap<String, BTreeMap<String, V>>) {
    for (name, entries) in remote {
        let target = local.entry(name).or_default();
        for (key, value) in entries {
            target.entry(key).or_insert(value);
        }
    }
}

/// Decide a field from the three versions, or `None` when both sides
/// changed it differently. Without a base, any difference is a conflict.
fn three_way<T: PartialEq + Clone>(base: Option<&T>, local: &T, remote: &T) -> Option<T> {
    if local == remote {
        return Some(local.clone());
    }
    match base {
        Some(base) if base == local => Some(remote.clone()),
        Some(base) if base == remote => Some(local.clone()),
        _ => None,
    }
}

/// `(base - removed_local - removed_remote) | added_local | added_remote`
///
/// keeps local order, then remote order for remote-only keywords
pub(crate) fn merge_keywords(base: Option<&[String]>, local: &[String], remote: &[String]) -> Vec<String> {
    let base: BTreeSet<&String> = base.unwrap_or_default().iter().collect();
    let ours: BTreeSet<&String> = local.iter().collect();
    let theirs: BTreeSet<&String> = remote.iter().collect();

    if ours == base {
        return remote.to_vec();
    }
    if theirs == base {
        return local.to_vec();
    }

    let keep = |keyword: &String| {
        if base.contains(keyword) {
            ours.contains(keyword) && theirs.contains(keyword)
        } else {
            true
        }
    };

    let mut merged: Vec<String> = Vec::new();
    for keyword in local.iter().chain(remote) {
        if keep(keyword) && !merged.contains(keyword) {
            merged.push(keyword.clone());
        }
    }
    merged
}

fn union_annotations(local: &[Annotation], remote: &[Annotation]) -> Vec<Annotation> {
    let mut merged = local.to_vec();
    for annotation in remote {
        if !merged.iter().any(|a| a.id == annotation.id) {
            merged.push(annotation.clone());
        }
    }
    merged
}

/// the larger of two numeric versions; non-numeric versions keep the local one
fn max_version(local: &str, remote: &str) -> String {
    match (local.trim().parse::<u64>(), remote.trim().parse::<u64>()) {
        (Ok(l), Ok(r)) if r > l => remote.to_string(),
        _ => local.to_string(),
    }
}

/// numeric components of the last word, `"provstore 1.2.3"` -> `[1, 2, 3]`
fn dotted_version(agent: &str) -> Vec<u64> {
    agent
        .split_whitespace()
        .last()
        .unwrap_or_default()
        .split(['.', '-', '+'])
        .map_while(|part| part.parse().ok())
        .collect()
}

fn describe_template(template: &Option<TemplateMetadata>) -> String {
    match template {
        Some(t) => format!(
            "{}@{} ({})",
            t.source.as_deref().unwrap_or("?"),
            t.reference.as_deref().unwrap_or("?"),
            t.id.as_deref().unwrap_or("?")
        ),
        None => "none".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::registry::{self, BTREE};
    use crate::codec::Fields;
    use crate::db::DatabaseConfig;
    use crate::merge::prompt::ScriptedPrompter;
    use crate::model::{Dataset, PLAN, Plan};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Database, Database) {
        let dir = TempDir::new().unwrap();
        let local = Database::open(DatabaseConfig::new(dir.path().join("local"))).unwrap();
        let remote = Database::open(DatabaseConfig::new(dir.path().join("remote"))).unwrap();
        (dir, local, remote)
    }

    fn btree(entries: Vec<(&str, ObjectHandle)>) -> ObjectHandle {
        let fields: Fields = entries
            .into_iter()
            .map(|(key, object)| (key.to_string(), Node::Persistent(object)))
            .collect();
        ObjectHandle::new(BTREE, fields)
    }

    fn entry(tree: &ObjectHandle, key: &str) -> ObjectHandle {
        tree.field(key).unwrap().unwrap().as_persistent().unwrap().clone()
    }

    fn project_handle(project: &Project) -> ObjectHandle {
        ObjectHandle::new(PROJECT, project.to_fields())
    }

    #[test]
    fn test_disjoint_additions() {
        let (_dir, local_db, remote_db) = setup();
        let x = local_db.insert(&Dataset::new("a")).unwrap();
        let y = remote_db.insert(&Dataset::new("b")).unwrap();
        let local = btree(vec![("a", x.clone())]);
        let remote = btree(vec![("b", y.clone())]);

        let mut prompter = ScriptedPrompter::default();
        let merged = ObjectMerger::new(&local_db, &mut prompter)
            .merge_objects(&local, &remote, &remote_db, None)
            .unwrap();

        assert!(merged.ptr_eq(&local));
        assert!(entry(&merged, "a").ptr_eq(&x));
        assert!(entry(&merged, "b").ptr_eq(&y));
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn test_derived_dataset_wins_without_prompt() {
        let (_dir, local_db, remote_db) = setup();
        let d0 = Dataset::new("my-data");
        let d1 = d0.derive();

        local_db.insert(&d0).unwrap();
        let local_d1 = local_db.insert(&d1).unwrap();
        local_db.commit().unwrap();
        let remote_d0 = remote_db.insert(&d0).unwrap();
        remote_db.commit().unwrap();

        let local = btree(vec![("my-data", local_d1.clone())]);
        let remote = btree(vec![("my-data", remote_d0)]);
        let mut prompter = ScriptedPrompter::default();
        let merged = ObjectMerger::new(&local_db, &mut prompter)
            .merge_objects(&local, &remote, &remote_db, None)
            .unwrap();

        assert!(entry(&merged, "my-data").ptr_eq(&local_d1));
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn test_remote_descendant_replaces_local() {
        let (_dir, local_db, remote_db) = setup();
        let p0 = Plan::new("train", "python train.py");
        let p1 = p0.derive();

        let local_p0 = local_db.insert(&p0).unwrap();
        remote_db.insert(&p0).unwrap();
        let remote_p1 = remote_db.insert(&p1).unwrap();
        remote_db.commit().unwrap();

        let local = btree(vec![("train", local_p0)]);
        let remote = btree(vec![("train", remote_p1.clone())]);
        let mut prompter = ScriptedPrompter::default();
        let merged = ObjectMerger::new(&local_db, &mut prompter)
            .merge_objects(&local, &remote, &remote_db, None)
            .unwrap();

        let winner = entry(&merged, "train");
        assert!(winner.ptr_eq(&remote_p1));
        assert_eq!(winner.type_tag(), Some(PLAN));
    }

    #[test]
    fn test_conflict_prompts() {
        let (_dir, local_db, remote_db) = setup();
        let base = Dataset::new("my-data");
        let local = btree(vec![("my-data", local_db.insert(&base.derive()).unwrap())]);
        let remote_choice = remote_db.insert(&base.derive()).unwrap();
        let remote = btree(vec![("my-data", remote_choice.clone())]);

        let mut prompter = ScriptedPrompter::new(["r"]);
        ObjectMerger::new(&local_db, &mut prompter)
            .merge_objects(&local, &remote, &remote_db, None)
            .unwrap();
        assert_eq!(prompter.asked().len(), 1);
        assert!(prompter.asked()[0].contains("Merge conflict for 'my-data'"));
        assert!(entry(&local, "my-data").ptr_eq(&remote_choice));
    }

    #[test]
    fn test_conflict_defaults_to_abort() {
        let (_dir, local_db, remote_db) = setup();
        let base = Dataset::new("my-data");
        let local = btree(vec![("my-data", local_db.insert(&base.derive()).unwrap())]);
        let remote = btree(vec![("my-data", remote_db.insert(&base.derive()).unwrap())]);

        let mut prompter = ScriptedPrompter::default();
        let result = ObjectMerger::new(&local_db, &mut prompter).merge_objects(&local, &remote, &remote_db, None);
        assert!(matches!(result, Err(MergeError::Aborted)));
    }

    #[test]
    fn test_tree_set_union() {
        let (_dir, local_db, remote_db) = setup();
        let members = |names: &[&str]| -> Fields {
            names.iter().map(|n| (n.to_string(), Node::Bool(true))).collect()
        };
        let local = ObjectHandle::new(registry::TREE_SET, members(&["a", "b"]));
        let remote = ObjectHandle::new(registry::TREE_SET, members(&["b", "c"]));

        let mut prompter = ScriptedPrompter::default();
        ObjectMerger::new(&local_db, &mut prompter)
            .merge_objects(&local, &remote, &remote_db, None)
            .unwrap();
        let keys: Vec<String> = local.fields().unwrap().into_keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_catalog_keeps_local_entries() {
        let (_dir, local_db, remote_db) = setup();
        let relations = |usage: &str| {
            let mut relations = BTreeMap::new();
            relations.insert("usages".to_string(), vec![usage.to_string()]);
            relations
        };
        let mut ours = Catalog::new();
        ours.index("/activities/1", relations("a.csv"));
        let mut theirs = Catalog::new();
        theirs.index("/activities/1", relations("changed.csv"));
        theirs.index("/activities/2", relations("a.csv"));

        let local = ObjectHandle::new(CATALOG, ours.to_fields());
        let remote = ObjectHandle::new(CATALOG, theirs.to_fields());
        let mut prompter = ScriptedPrompter::default();
        ObjectMerger::new(&local_db, &mut prompter)
            .merge_objects(&local, &remote, &remote_db, None)
            .unwrap();

        let merged: Catalog = local_db.decode(&local).unwrap();
        assert_eq!(merged.find("usages", "a.csv"), vec!["/activities/1"]);
        assert!(merged.contains("/activities/2"));
        assert_eq!(
            merged.token_to_values["/activities/1"]["usages"],
            BTreeSet::from(["a.csv".to_string()])
        );
    }

    #[test]
    fn test_project_keywords_merge() {
        let (_dir, local_db, remote_db) = setup();
        let base = Project::new("group", "demo").with_keywords(["x"]);
        let ours = base.clone().with_keywords(["x", "y"]);
        let theirs = base.clone().with_keywords(["x", "z"]);

        let local = project_handle(&ours);
        let mut prompter = ScriptedPrompter::default();
        ObjectMerger::new(&local_db, &mut prompter)
            .merge_objects(&local, &project_handle(&theirs), &remote_db, Some(&project_handle(&base)))
            .unwrap();

        let merged: Project = local_db.decode(&local).unwrap();
        let keywords: BTreeSet<String> = merged.keywords.into_iter().collect();
        assert_eq!(keywords, BTreeSet::from(["x".into(), "y".into(), "z".into()]));
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn test_keyword_removal_is_kept() {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let merged = merge_keywords(
            Some(&strings(&["x", "y"])),
            &strings(&["x", "w"]),
            &strings(&["x", "y", "z"]),
        );
        assert_eq!(merged, strings(&["x", "w", "z"]));

        // only one side changed
        let merged = merge_keywords(Some(&strings(&["x"])), &strings(&["x"]), &strings(&[]));
        assert!(merged.is_empty());

        // no base: plain union
        let merged = merge_keywords(None, &strings(&["a"]), &strings(&["b"]));
        assert_eq!(merged, strings(&["a", "b"]));
    }

    #[test]
    fn test_project_description_prompt_defaults_to_local() {
        let (_dir, local_db, remote_db) = setup();
        let base = Project::new("group", "demo").with_description("A");
        let ours = base.clone().with_description("B");
        let theirs = base.clone().with_description("C");

        let local = project_handle(&ours);
        let mut prompter = ScriptedPrompter::default();
        ObjectMerger::new(&local_db, &mut prompter)
            .merge_objects(&local, &project_handle(&theirs), &remote_db, Some(&project_handle(&base)))
            .unwrap();

        assert_eq!(prompter.asked().len(), 1);
        assert!(prompter.asked()[0].contains("local:  B"));
        let merged: Project = local_db.decode(&local).unwrap();
        assert_eq!(merged.description.as_deref(), Some("B"));
    }

    #[test]
    fn test_project_one_sided_changes() {
        let (_dir, local_db, remote_db) = setup();
        let mut base = Project::new("group", "demo").with_description("A");
        base.version = "9".into();
        base.agent_version = Some("provstore 0.9.0".into());
        let ours = base.clone().with_description("B");
        let mut theirs = base.clone();
        theirs.version = "10".into();
        theirs.agent_version = Some("provstore 0.10.1".into());
        theirs.annotations.push(Annotation {
            id: "/annotations/1".into(),
            source: "tool".into(),
            body: "{}".into(),
        });
        theirs.template = Some(TemplateMetadata {
            source: Some("https://example.com/templates".into()),
            reference: Some("main".into()),
            id: Some("python-minimal".into()),
            version: None,
        });

        let local = project_handle(&ours);
        let mut prompter = ScriptedPrompter::default();
        ObjectMerger::new(&local_db, &mut prompter)
            .merge_objects(&local, &project_handle(&theirs), &remote_db, Some(&project_handle(&base)))
            .unwrap();

        let merged: Project = local_db.decode(&local).unwrap();
        assert_eq!(merged.description.as_deref(), Some("B"));
        assert_eq!(merged.version, "10");
        assert_eq!(merged.agent_version.as_deref(), Some("provstore 0.10.1"));
        assert_eq!(merged.annotations, theirs.annotations);
        assert_eq!(merged.template, theirs.template);
        assert_eq!(merged.name, "demo");
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn test_project_template_conflict() {
        let (_dir, local_db, remote_db) = setup();
        let template = |reference: &str| TemplateMetadata {
            source: Some("https://example.com/templates".into()),
            reference: Some(reference.into()),
            id: Some("python-minimal".into()),
            version: None,
        };
        let mut base = Project::new("group", "demo");
        base.template = Some(template("v1"));
        let mut ours = base.clone();
        ours.template = Some(template("v2"));
        let mut theirs = base.clone();
        theirs.template = Some(template("v3"));

        let local = project_handle(&ours);
        let mut prompter = ScriptedPrompter::new(["r"]);
        ObjectMerger::new(&local_db, &mut prompter)
            .merge_objects(&local, &project_handle(&theirs), &remote_db, Some(&project_handle(&base)))
            .unwrap();

        let merged: Project = local_db.decode(&local).unwrap();
        assert_eq!(merged.template, Some(template("v3")));
    }

    #[test]
    fn test_unsupported_types() {
        let (_dir, local_db, remote_db) = setup();
        let mut prompter = ScriptedPrompter::default();
        let mut merger = ObjectMerger::new(&local_db, &mut prompter);

        let result = merger.merge_values(&Node::from("a"), &Node::from("b"), &remote_db, None);
        match result {
            Err(MergeError::UnsupportedType { local, remote }) => {
                assert_eq!(local, "str");
                assert_eq!(remote, "str");
            }
            other => panic!("expected unsupported type, got {:?}", other),
        }

        let dataset = Dataset::new("d");
        let local = ObjectHandle::new(crate::model::DATASET, dataset.to_fields());
        let remote = ObjectHandle::new(crate::model::DATASET, dataset.derive().to_fields());
        assert!(matches!(
            merger.merge_objects(&local, &remote, &remote_db, None),
            Err(MergeError::UnsupportedType { .. })
        ));

        let tree = btree(Vec::new());
        assert!(matches!(
            merger.merge_objects(&tree, &project_handle(&Project::new("g", "p")), &remote_db, None),
            Err(MergeError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_index_entries_merge() {
        let (_dir, local_db, remote_db) = setup();
        let local_index = local_db.add_index("datasets", crate::model::DATASET, Some("name")).unwrap();
        let remote_index = remote_db.add_index("datasets", crate::model::DATASET, Some("name")).unwrap();
        let ours = local_db.insert(&Dataset::new("ours")).unwrap();
        let theirs = remote_db.insert(&Dataset::new("theirs")).unwrap();
        local_index.add(&local_db, &ours, None, None).unwrap();
        remote_index.add(&remote_db, &theirs, None, None).unwrap();

        let mut prompter = ScriptedPrompter::default();
        ObjectMerger::new(&local_db, &mut prompter)
            .merge_values(&Node::Index(local_index.clone()), &Node::Index(remote_index), &remote_db, None)
            .unwrap();

        assert_eq!(
            local_index.keys(&local_db, &crate::db::KeyRange::all()).unwrap(),
            vec!["ours", "theirs"]
        );
    }

    #[test]
    fn test_version_helpers() {
        assert_eq!(max_version("9", "10"), "10");
        assert_eq!(max_version("10", "9"), "10");
        assert_eq!(max_version("x", "10"), "x");
        assert!(dotted_version("provstore 0.10.1") > dotted_version("provstore 0.9.0"));
        assert_eq!(dotted_version("1.2.3-dev"), vec![1, 2, 3]);
    }
}
