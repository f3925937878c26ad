//!  tree operations for reading committed metadata.
//!
//! in Git, a tree is a directory. The metadata database is one subtree of
//! the project tree; merging needs to read single files from it and to
//! materialize the whole subtree of another commit on disk.

use std::fs;
use std::path::Path;

use git2::{ObjectType, Repository, Tree};

use crate::git::error::{GitError, GitResult};
use crate::git::types::TreeId;

/// A read only handle to a git tree at a specific commit
///
/// think of it as a snapshot - it won't change even if new commits are made.
#[derive(Debug)]
pub struct TreeHandle<'repo> {
    tree: Tree<'repo>,
}

impl<'repo> TreeHandle<'repo> {
    /// create a TreeHandle from a git2::Tree
    pub(crate) fn new(tree: Tree<'repo>) -> Self {
        Self { tree }
    }

    /// the directory at `path`, if there is one
    pub fn subtree(&self, repo: &'repo Repository, path: &Path) -> GitResult<Option<TreeHandle<'repo>>> {
        let entry = match self.tree.get_path(path) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if entry.kind() != Some(ObjectType::Tree) {
            return Ok(None);
        }
        Ok(Some(TreeHandle::new(repo.find_tree(entry.id())?)))
    }

    /// contents of the file at `path`, if there is one
    pub fn read_blob(&self, repo: &Repository, path: &Path) -> GitResult<Option<Vec<u8>>> {
        let entry = match self.tree.get_path(path) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }
        Ok(Some(repo.find_blob(entry.id())?.content().to_vec()))
    }

    /// write every file of this tree below `dest`, returning the file count
    pub fn export(&self, repo: &Repository, dest: &Path) -> GitResult<usize> {
        fs::create_dir_all(dest)?;
        let mut written = 0;
        for entry in self.tree.iter() {
            let name = entry
                .name()
                .ok_or_else(|| GitError::Io(std::io::Error::other("tree entry name is not UTF-8")))?;
            let target = dest.join(name);
            match entry.kind() {
                Some(ObjectType::Tree) => {
                    let subtree = TreeHandle::new(repo.find_tree(entry.id())?);
                    written += subtree.export(repo, &target)?;
                }
                Some(ObjectType::Blob) => {
                    fs::write(&target, repo.find_blob(entry.id())?.content())?;
                    written += 1;
                }
                // submodules and the like are not part of the metadata
                _ => {}
            }
        }
        Ok(written)
    }
}

/// create an empty tree
pub fn create_initial_tree(repo: &Repository) -> GitResult<TreeId> {
    let builder = repo.treebuilder(None)?;
    Ok(TreeId::new(builder.write()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    /// a tree with `meta/root` and `meta/ab/obj`
    fn nested_tree(repo: &Repository) -> TreeHandle<'_> {
        let mode: i32 = git2::FileMode::Blob.into();
        let tree_mode: i32 = git2::FileMode::Tree.into();

        let mut inner = repo.treebuilder(None).unwrap();
        inner.insert("obj", repo.blob(b"object").unwrap(), mode).unwrap();
        let inner_id = inner.write().unwrap();

        let mut meta = repo.treebuilder(None).unwrap();
        meta.insert("root", repo.blob(b"{}").unwrap(), mode).unwrap();
        meta.insert("ab", inner_id, tree_mode).unwrap();
        let meta_id = meta.write().unwrap();

        let mut top = repo.treebuilder(None).unwrap();
        top.insert("meta", meta_id, tree_mode).unwrap();
        let top_id = top.write().unwrap();
        TreeHandle::new(repo.find_tree(top_id).unwrap())
    }

    #[test]
    fn test_empty_tree() {
        let (_dir, repo) = setup_repo();
        let tree_id = create_initial_tree(&repo).unwrap();
        let tree = repo.find_tree(tree_id.raw()).unwrap();
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn test_subtree_and_blob() {
        let (_dir, repo) = setup_repo();
        let tree = nested_tree(&repo);

        assert!(tree.subtree(&repo, Path::new("meta")).unwrap().is_some());
        assert!(tree.subtree(&repo, Path::new("missing")).unwrap().is_none());
        assert!(tree.subtree(&repo, Path::new("meta/root")).unwrap().is_none());

        let blob = tree.read_blob(&repo, Path::new("meta/ab/obj")).unwrap();
        assert_eq!(blob.as_deref(), Some(&b"object"[..]));
        assert!(tree.read_blob(&repo, Path::new("meta/nothing")).unwrap().is_none());
    }

    #[test]
    fn test_export() {
        let (_dir, repo) = setup_repo();
        let tree = nested_tree(&repo);
        let meta = tree.subtree(&repo, Path::new("meta")).unwrap().unwrap();

        let out = TempDir::new().unwrap();
        let written = meta.export(&repo, out.path()).unwrap();
        assert_eq!(written, 2);
        assert_eq!(fs::read(out.path().join("root")).unwrap(), b"{}");
        assert_eq!(fs::read(out.path().join("ab").join("obj")).unwrap(), b"object");
    }
}
