//! The repository contract the auto-commit core is written against

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;

/// Stable identifier of a repository (its canonical working-tree root)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoId(String);

impl RepoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier derived from a working-tree root
    pub fn from_root(root: &Path) -> Self {
        let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        Self(canonical.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a git reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefType {
    /// Local branch
    Head,
    /// Remote-tracking branch
    RemoteHead,
    Tag,
}

/// A named reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ref {
    /// Short name (`main`, `origin/main`, `v1.0`)
    pub name: String,
    pub ref_type: RefType,
    /// Target commit, if it resolves to one
    pub commit: Option<String>,
}

impl Ref {
    pub fn new(name: impl Into<String>, ref_type: RefType) -> Self {
        Self {
            name: name.into(),
            ref_type,
            commit: None,
        }
    }
}

/// A single pending modification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Change {
    /// Absolute path of the changed file
    pub path: PathBuf,
}

impl Change {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Snapshot of a repository's branch and pending changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryState {
    /// Checked-out branch; `None` when HEAD is detached
    pub head: Option<String>,
    /// Unstaged edits, including untracked files
    pub working_tree_changes: Vec<Change>,
    /// Staged edits
    pub index_changes: Vec<Change>,
    /// Unresolved merge conflicts
    pub merge_changes: Vec<Change>,
}

impl RepositoryState {
    /// Union of all three change lists, first occurrence order, no duplicates
    pub fn all_changed_paths(&self) -> Vec<PathBuf> {
        let mut seen = std::collections::HashSet::new();
        self.working_tree_changes
            .iter()
            .chain(&self.merge_changes)
            .chain(&self.index_changes)
            .filter(|c| seen.insert(c.path.clone()))
            .map(|c| c.path.clone())
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        !(self.working_tree_changes.is_empty()
            && self.index_changes.is_empty()
            && self.merge_changes.is_empty())
    }
}

/// Options for [`Repository::commit`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOptions {
    /// Stage every tracked and untracked change first
    pub all: bool,
    /// Skip commit hooks
    pub no_verify: bool,
    /// Author and committer date; the current time when `None`
    pub timestamp: Option<DateTime<Utc>>,
}

/// How a push may overwrite the remote branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcePushMode {
    Force,
    ForceWithLease,
}

/// A version-controlled working tree
#[async_trait]
pub trait Repository: Send + Sync {
    /// Stable identifier used to key per-repository state
    fn id(&self) -> RepoId;

    /// Working-tree root
    fn root(&self) -> &Path;

    /// Current branch and pending changes
    async fn state(&self) -> Result<RepositoryState>;

    /// Create a commit
    async fn commit(&self, message: &str, options: &CommitOptions) -> Result<()>;

    /// Push `branch` (the current one when `None`) to `remote`
    async fn push(
        &self,
        remote: &str,
        branch: Option<&str>,
        set_upstream: bool,
        force: Option<ForcePushMode>,
    ) -> Result<()>;

    /// Pull the upstream of the current branch
    async fn pull(&self) -> Result<()>;

    /// All local branches, remote-tracking branches and tags
    async fn get_refs(&self) -> Result<Vec<Ref>>;

    /// Patch of `path` between HEAD and the working tree
    async fn diff_with_head(&self, path: &Path) -> Result<String>;

    /// Check out `paths` (or the whole tree when empty) from `treeish`
    async fn checkout(&self, treeish: &str, paths: &[PathBuf]) -> Result<()>;

    /// Move the current branch to `treeish`, keeping the working tree
    async fn reset(&self, treeish: &str) -> Result<()>;

    /// Apply the inverse of `treeish` without committing
    async fn revert_no_commit(&self, treeish: &str) -> Result<()>;

    /// Create a local branch at HEAD
    async fn create_branch(&self, name: &str, checkout: bool) -> Result<()>;

    /// Delete a local branch
    async fn delete_branch(&self, name: &str, force: bool) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_changed_paths_dedupes() {
        let state = RepositoryState {
            head: Some("main".to_string()),
            working_tree_changes: vec![Change::new("/r/a.md"), Change::new("/r/b.md")],
            index_changes: vec![Change::new("/r/a.md")],
            merge_changes: vec![Change::new("/r/c.md")],
        };

        assert_eq!(
            state.all_changed_paths(),
            vec![
                PathBuf::from("/r/a.md"),
                PathBuf::from("/r/b.md"),
                PathBuf::from("/r/c.md")
            ]
        );
        assert!(state.has_changes());
        assert!(!RepositoryState::default().has_changes());
    }

    #[test]
    fn test_repo_id_display() {
        let id = RepoId::new("/work/notes");
        assert_eq!(id.to_string(), "/work/notes");
        assert_eq!(id.as_str(), "/work/notes");
    }
}
