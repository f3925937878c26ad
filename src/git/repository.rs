//!   Core Git repository wrapper.
//!
//!  It wraps `git2::Repository` and provides the high-level operations the
//!  merge driver and the command line need: reading files at a commit, committing the working directory and exporting the
//!  metadata directory of a commit.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::{IndexAddOption, Repository, RepositoryInitOptions, ResetType};
use parking_lot::RwLock;

use crate::git::commit::{self, CommitBuilder, CommitInfo};
use crate::git::error::{GitError, GitResult};
use crate::git::refs::RefManager;
use crate::git::types::{BranchName, CommitId, GitSignature, TreeId};
use crate::git::worktree::{Worktree, WORKTREE_PREFIX};

/// The main Git repository wrapper.
///
/// Clone this to share it - it uses Arc internally.
#[derive(Clone)]
pub struct GitRepository {
    inner: Arc<GitRepositoryInner>,
}

struct GitRepositoryInner {
    repo: RwLock<Repository>,
    path: PathBuf,
    signature: GitSignature,
}

impl GitRepository {
    fn from_repo(repo: Repository, path: &Path, signature: GitSignature) -> Self {
        Self {
            inner: Arc::new(GitRepositoryInner {
                repo: RwLock::new(repo),
                path: path.to_path_buf(),
                signature,
            }),
        }
    }

    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> GitResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|_| GitError::NotInitialized(path.to_path_buf()))?;
        Ok(Self::from_repo(repo, path, GitSignature::provstore()))
    }

    /// Initialize a new repository with an empty first commit on `main`.
    pub fn init(path: impl AsRef<Path>) -> GitResult<Self> {
        let path = path.as_ref();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(BranchName::MAIN);
        let repo = Repository::init_opts(path, &opts)?;

        let repository = Self::from_repo(repo, path, GitSignature::provstore());
        repository.with_repo(|repo| {
            let commit_id = commit::create_initial_commit(repo, &repository.inner.signature)?;
            RefManager::init_main_branch(repo, commit_id)
        })?;

        tracing::info!(path = %path.display(), "initialized repository");
        Ok(repository)
    }

    /// Open or initialize a repository.
    pub fn open_or_init(path: impl AsRef<Path>) -> GitResult<Self> {
        let path = path.as_ref();
        if path.join(".git").exists() {
            Self::open(path)
        } else {
            Self::init(path)
        }
    }

    /// Get the repository path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// the working directory of a non-bare repository
    pub fn workdir(&self) -> GitResult<PathBuf> {
        self.with_repo(|repo| repo.workdir().map(Path::to_path_buf).ok_or(GitError::NoWorkdir))
    }

    /// Execute a function with read access to the repository.
    pub fn with_repo<F, T>(&self, f: F) -> GitResult<T>
    where
        F: FnOnce(&Repository) -> GitResult<T>,
    {
        let repo = self.inner.repo.read();
        f(&repo)
    }

    /// Execute a function with exclusive access to the repository.
    pub fn with_repo_mut<F, T>(&self, f: F) -> GitResult<T>
    where
        F: FnOnce(&Repository) -> GitResult<T>,
    {
        let repo = self.inner.repo.write();
        f(&repo)
    }

    // ==================== Commits and refs ====================

    /// Get the current HEAD commit.
    pub fn head(&self) -> GitResult<CommitId> {
        self.with_repo(RefManager::head_commit)
    }

    /// Get information about a commit.
    pub fn get_commit(&self, id: CommitId) -> GitResult<CommitInfo> {
        self.with_repo(|repo| commit::get_commit(repo, id))
    }

    /// Stage every change in the working directory and commit it on HEAD.
    pub fn commit_all(&self, message: &str) -> GitResult<CommitId> {
        self.with_repo_mut(|repo| {
            let mut index = repo.index()?;
            // an empty pathspec matches every path, dotfiles included
            index.add_all(std::iter::empty::<&str>(), IndexAddOption::DEFAULT, None)?;
            index.update_all(std::iter::empty::<&str>(), None)?;
            index.write()?;
            let tree_id = index.write_tree()?;

            let mut builder = CommitBuilder::new(repo)
                .tree(TreeId::new(tree_id))
                .message(message)
                .signature(self.inner.signature.clone())
                .update_ref("HEAD");
            match RefManager::head_commit(repo) {
                Ok(parent) => builder = builder.parent(parent),
                Err(GitError::EmptyRepository) => {}
                Err(e) => return Err(e),
            }
            let id = builder.commit()?;
            tracing::debug!(commit = %id.short(), message, "committed working directory");
            Ok(id)
        })
    }

    /// Move HEAD to `commit` and overwrite the working directory.
    pub fn reset_hard(&self, commit: CommitId) -> GitResult<()> {
        self.with_repo_mut(|repo| {
            let object = repo
                .find_object(commit.raw(), None)
                .map_err(|_| GitError::CommitNotFound(commit.to_string()))?;
            repo.reset(&object, ResetType::Hard, None)?;
            Ok(())
        })
    }

    // ==================== Files ====================

    /// Contents of the file at `path` in `commit`.
    pub fn read_file_at(&self, commit: CommitId, path: &Path) -> GitResult<Vec<u8>> {
        self.with_repo(|repo| {
            let tree = commit::get_tree_at_commit(repo, commit)?;
            tree.read_blob(repo, path)?.ok_or_else(|| GitError::PathNotFound {
                commit: commit.short(),
                path: path.to_path_buf(),
            })
        })
    }

    /// Export the directory `subtree` of `commit` into a fresh temp dir
    /// created below `temp_root`.
    ///
    /// The files land at the same relative path below the temp dir.
    pub fn checkout_subtree(&self, commit: CommitId, subtree: &Path, temp_root: &Path) -> GitResult<Worktree> {
        self.with_repo(|repo| {
            let tree = commit::get_tree_at_commit(repo, commit)?;
            let subtree_handle = tree.subtree(repo, subtree)?.ok_or_else(|| GitError::PathNotFound {
                commit: commit.short(),
                path: subtree.to_path_buf(),
            })?;

            let dir = tempfile::Builder::new().prefix(WORKTREE_PREFIX).tempdir_in(temp_root)?;
            let worktree = Worktree::new(dir, subtree, commit);
            let files = subtree_handle.export(repo, worktree.metadata_path())?;
            tracing::debug!(
                commit = %commit.short(),
                files,
                path = %worktree.path().display(),
                "exported metadata worktree"
            );
            Ok(worktree)
        })
    }
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository").field("path", &self.inner.path).finish()
    }
}
