//! The merge driver: resolves a conflicting metadata file.
//!
//! Git hands the driver three files: the common ancestor, the local version
//! (which receives the result) and the remote version. Objects referenced
//! from the remote version only exist in the remote commit, so every remote
//! commit taking part in the merge gets its metadata exported to a temporary
//! directory and opened as a database of its own.
//!
//! With several remotes (an octopus merge) they are folded into the local
//! object one after another, in the order given.

use std::fs;
use std::path::{Path, PathBuf};

use crate::db::{Database, DatabaseConfig, ObjectHandle, DEFAULT_METADATA_PATH};
use crate::git::{CommitId, GitRepository, Worktree};
use crate::merge::error::{MergeError, MergeResult};
use crate::merge::prompt::Prompter;
use crate::merge::strategy::ObjectMerger;
use crate::storage::Oid;

/// Merge driver configuration.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// metadata directory, relative to the repository root
    pub metadata_dir: PathBuf,
    /// where remote worktrees are created
    pub temp_dir: PathBuf,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            metadata_dir: PathBuf::from(DEFAULT_METADATA_PATH),
            temp_dir: std::env::temp_dir(),
        }
    }
}

impl MergeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the metadata directory.
    pub fn metadata_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_dir = path.into();
        self
    }

    /// Set the directory remote worktrees are created in.
    pub fn temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_dir = path.into();
        self
    }
}

/// One conflicting file.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    /// common ancestor version; may be empty or missing
    pub base: PathBuf,
    /// local version, overwritten with the result
    pub local: PathBuf,
    /// remote version, only read when no remote commits are given
    pub remote: PathBuf,
    /// remote commits taking part in the merge
    pub remotes: Vec<CommitId>,
}

impl MergeRequest {
    pub fn new(base: impl Into<PathBuf>, local: impl Into<PathBuf>, remote: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            local: local.into(),
            remote: remote.into(),
            remotes: Vec::new(),
        }
    }

    pub fn remotes(mut self, remotes: impl IntoIterator<Item = CommitId>) -> Self {
        self.remotes = remotes.into_iter().collect();
        self
    }
}

struct RemoteEntry {
    commit: CommitId,
    worktree: Worktree,
    database: Database,
}

/// Three-way merge of metadata files on object graphs.
pub struct GitMerger<'a> {
    repository: &'a GitRepository,
    database: &'a Database,
    config: MergeConfig,
    prompter: &'a mut dyn Prompter,
}

impl<'a> GitMerger<'a> {
    pub fn new(repository: &'a GitRepository, database: &'a Database, prompter: &'a mut dyn Prompter) -> Self {
        Self {
            repository,
            database,
            config: MergeConfig::default(),
            prompter,
        }
    }

    pub fn with_config(mut self, config: MergeConfig) -> Self {
        self.config = config;
        self
    }

    /// Merge the conflicting file and write the result over `request.local`.
    ///
    /// Temporary worktrees are removed whether or not the merge succeeds.
    pub fn merge(&mut self, request: &MergeRequest) -> MergeResult<ObjectHandle> {
        let remotes = self.setup_worktrees(&request.remotes)?;
        let result = self.merge_remotes(request, &remotes);
        for entry in remotes {
            entry.worktree.remove();
        }
        let merged = result?;

        self.database.persist_to_path(&merged, &request.local)?;
        self.database.commit()?;
        tracing::info!(path = %request.local.display(), "merged metadata file");
        Ok(merged)
    }

    fn setup_worktrees(&self, commits: &[CommitId]) -> MergeResult<Vec<RemoteEntry>> {
        let mut entries = Vec::new();
        for &commit in commits {
            let worktree = match self
                .repository
                .checkout_subtree(commit, &self.config.metadata_dir, &self.config.temp_dir)
            {
                Ok(worktree) => worktree,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(commit = %commit.short(), "remote has no metadata, skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let config = DatabaseConfig::new(worktree.metadata_path()).create_if_missing(false);
            let database = Database::open(config)?;
            entries.push(RemoteEntry {
                commit,
                worktree,
                database,
            });
        }
        Ok(entries)
    }

    fn merge_remotes(&mut self, request: &MergeRequest, remotes: &[RemoteEntry]) -> MergeResult<ObjectHandle> {
        let local = self.database.get_from_path(&request.local)?;
        let oid = local.oid().unwrap_or_else(Oid::root);
        let base = self.load_base(&request.base);
        let database = self.database;
        let mut merger = ObjectMerger::new(database, &mut *self.prompter);

        if request.remotes.is_empty() {
            // references in the remote file resolve through the local database
            let remote = database.get_from_path(&request.remote)?;
            return merger.merge_objects(&local, &remote, database, base.as_ref());
        }

        let mut merged = None;
        for entry in remotes {
            let remote = match entry.database.get(&oid) {
                Ok(remote) => remote,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(commit = %entry.commit.short(), oid = oid.short(), "object missing on remote");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let current = merged.as_ref().unwrap_or(&local);
            merged = Some(merger.merge_objects(current, &remote, &entry.database, base.as_ref())?);
        }
        merged.ok_or(MergeError::RemoteObjectNotFound)
    }

    /// the base object, or `None` when git had no common version
    fn load_base(&self, path: &Path) -> Option<ObjectHandle> {
        match fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => {}
            _ => return None,
        }
        match self.database.get_from_path(path) {
            Ok(base) => Some(base),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "ignoring unreadable base");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::KeyRange;
    use crate::git::WORKTREE_PREFIX;
    use crate::merge::prompt::ScriptedPrompter;
    use crate::model::{initialize_database, Dataset, Project, DATASETS_INDEX};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        repo: GitRepository,
    }

    impl Fixture {
        fn metadata(&self) -> PathBuf {
            self.dir.path().join(DEFAULT_METADATA_PATH)
        }

        fn database(&self) -> Database {
            Database::open(DatabaseConfig::new(self.metadata())).unwrap()
        }

        fn add_dataset(&self, name: &str) -> CommitId {
            let db = self.database();
            let dataset = db.insert(&Dataset::new(name)).unwrap();
            db.index(DATASETS_INDEX).unwrap().add(&db, &dataset, None, None).unwrap();
            db.commit().unwrap();
            self.repo.commit_all(&format!("add {}", name)).unwrap()
        }

        /// path of the datasets index entries file, relative to the repo
        fn entries_path(&self) -> PathBuf {
            let db = self.database();
            let index = db.index(DATASETS_INDEX).unwrap();
            let oid = index.entries().oid().unwrap();
            let path = db.storage().resolve(oid.as_str(), false).unwrap();
            path.strip_prefix(self.dir.path()).unwrap().to_path_buf()
        }

        fn export(&self, commit: CommitId, path: &Path, name: &str) -> PathBuf {
            let target = self.dir.path().join(name);
            fs::write(&target, self.repo.read_file_at(commit, path).unwrap()).unwrap();
            target
        }
    }

    fn leftover_worktrees(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.file_name().unwrap().to_string_lossy().starts_with(WORKTREE_PREFIX))
            .collect()
    }

    fn setup() -> (Fixture, CommitId) {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::init(dir.path()).unwrap();
        let fixture = Fixture { dir, repo };

        let db = fixture.database();
        initialize_database(&db, &Project::new("group", "demo")).unwrap();
        db.commit().unwrap();
        let base = fixture.repo.commit_all("initialize metadata").unwrap();
        (fixture, base)
    }

    #[test]
    fn test_merge_index_entries_from_remote_commit() {
        let (fixture, base) = setup();
        let remote = fixture.add_dataset("theirs");
        fixture.repo.reset_hard(base).unwrap();
        let local = fixture.add_dataset("ours");

        let entries = fixture.entries_path();
        let base_file = fixture.export(base, &entries, "merge-base");
        let remote_file = fixture.export(remote, &entries, "merge-remote");
        let local_file = fixture.dir.path().join(&entries);
        assert_eq!(fixture.repo.head().unwrap(), local);

        let db = fixture.database();
        let mut prompter = ScriptedPrompter::default();
        let request = MergeRequest::new(&base_file, &local_file, &remote_file).remotes([remote]);
        GitMerger::new(&fixture.repo, &db, &mut prompter).merge(&request).unwrap();
        assert!(prompter.asked().is_empty());

        let db = fixture.database();
        let index = db.index(DATASETS_INDEX).unwrap();
        assert_eq!(index.keys(&db, &KeyRange::all()).unwrap(), vec!["ours", "theirs"]);
    }

    #[test]
    fn test_merge_without_remote_commits_reads_remote_file() {
        let (fixture, base) = setup();
        let remote = fixture.add_dataset("theirs");
        fixture.repo.reset_hard(base).unwrap();
        fixture.add_dataset("ours");

        let entries = fixture.entries_path();
        let remote_file = fixture.export(remote, &entries, "merge-remote");
        let local_file = fixture.dir.path().join(&entries);
        let missing_base = fixture.dir.path().join("no-base");

        let db = fixture.database();
        let mut prompter = ScriptedPrompter::default();
        let request = MergeRequest::new(&missing_base, &local_file, &remote_file);
        GitMerger::new(&fixture.repo, &db, &mut prompter).merge(&request).unwrap();

        let db = fixture.database();
        let index = db.index(DATASETS_INDEX).unwrap();
        assert_eq!(index.keys(&db, &KeyRange::all()).unwrap(), vec!["ours", "theirs"]);
    }

    #[test]
    fn test_remote_without_metadata() {
        let (fixture, base) = setup();
        let initial = fixture.repo.get_commit(base).unwrap().parent_ids[0];
        let local_file = fixture.metadata().join("root");

        let db = fixture.database();
        let mut prompter = ScriptedPrompter::default();
        let request = MergeRequest::new(&local_file, &local_file, &local_file).remotes([initial]);
        let result = GitMerger::new(&fixture.repo, &db, &mut prompter).merge(&request);
        assert!(matches!(result, Err(MergeError::RemoteObjectNotFound)));
    }

    #[test]
    fn test_octopus_merge_folds_remotes_in_order() {
        let (fixture, base) = setup();
        let first = fixture.add_dataset("one");
        fixture.repo.reset_hard(base).unwrap();
        let second = fixture.add_dataset("two");
        fixture.repo.reset_hard(base).unwrap();
        fixture.add_dataset("mine");

        let entries = fixture.entries_path();
        let base_file = fixture.export(base, &entries, "merge-base");
        let remote_file = fixture.export(first, &entries, "merge-remote");
        let local_file = fixture.dir.path().join(&entries);
        let temp_root = TempDir::new().unwrap();

        let db = fixture.database();
        let mut prompter = ScriptedPrompter::default();
        let request = MergeRequest::new(&base_file, &local_file, &remote_file).remotes([first, second]);
        GitMerger::new(&fixture.repo, &db, &mut prompter)
            .with_config(MergeConfig::new().temp_dir(temp_root.path()))
            .merge(&request)
            .unwrap();
        assert!(prompter.asked().is_empty());
        assert!(leftover_worktrees(temp_root.path()).is_empty());

        let db = fixture.database();
        let index = db.index(DATASETS_INDEX).unwrap();
        assert_eq!(index.keys(&db, &KeyRange::all()).unwrap(), vec!["mine", "one", "two"]);
    }

    #[test]
    fn test_aborted_merge_removes_worktrees() {
        let (fixture, base) = setup();
        let remote = fixture.add_dataset("shared");
        fixture.repo.reset_hard(base).unwrap();
        fixture.add_dataset("shared");

        let entries = fixture.entries_path();
        let base_file = fixture.export(base, &entries, "merge-base");
        let remote_file = fixture.export(remote, &entries, "merge-remote");
        let local_file = fixture.dir.path().join(&entries);
        let before = fs::read(&local_file).unwrap();
        let temp_root = TempDir::new().unwrap();

        let db = fixture.database();
        // no scripted answer takes the default, which aborts
        let mut prompter = ScriptedPrompter::default();
        let request = MergeRequest::new(&base_file, &local_file, &remote_file).remotes([remote]);
        let result = GitMerger::new(&fixture.repo, &db, &mut prompter)
            .with_config(MergeConfig::new().temp_dir(temp_root.path()))
            .merge(&request);

        assert!(matches!(result, Err(MergeError::Aborted)));
        assert_eq!(prompter.asked().len(), 1);
        assert!(leftover_worktrees(temp_root.path()).is_empty());
        assert_eq!(fs::read(&local_file).unwrap(), before);
    }

    #[test]
    fn test_config_builder() {
        let config = MergeConfig::new().metadata_dir("meta").temp_dir("/scratch");
        assert_eq!(config.metadata_dir, PathBuf::from("meta"));
        assert_eq!(config.temp_dir, PathBuf::from("/scratch"));

        let defaults = MergeConfig::default();
        assert_eq!(defaults.metadata_dir, PathBuf::from(DEFAULT_METADATA_PATH));
        assert_eq!(defaults.temp_dir, std::env::temp_dir());
    }
}
