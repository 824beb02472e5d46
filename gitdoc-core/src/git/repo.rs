//! Git repository detection and operations
//!
//! Reads (status, refs, diffs) go through libgit2. Anything that writes to
//! the repository or talks to a remote shells out to `git` so hooks and
//! credential helpers run as the user expects.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use git2::{BranchType, DiffFormat, DiffOptions, Status, StatusOptions};

use super::command::{is_push_rejection, run_git};
use super::handle::{
    Change, CommitOptions, ForcePushMode, Ref, RefType, RepoId, Repository, RepositoryState,
};
use crate::{Error, Result};

/// A git repository on disk
pub struct GitRepo {
    repo: Mutex<git2::Repository>,
    root: PathBuf,
    git_dir: PathBuf,
    id: RepoId,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl GitRepo {
    /// Open a git repository at the given path
    ///
    /// This will search upward from the given path to find the repository root.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let repo = git2::Repository::discover(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                Error::Config(format!(
                    "Not a git repository: {}. Run 'git init' first or navigate to a git repository.",
                    path.display()
                ))
            } else {
                Error::Git(e)
            }
        })?;

        let root = repo
            .workdir()
            .ok_or_else(|| Error::Config("Bare repositories are not supported".to_string()))?
            .to_path_buf();
        let git_dir = repo.path().to_path_buf();
        let id = RepoId::from_root(&root);

        Ok(Self {
            repo: Mutex::new(repo),
            root,
            git_dir,
            id,
        })
    }

    /// The `.git` directory
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Get the current branch name
    ///
    /// Returns the branch HEAD points at, even if it has no commits yet;
    /// `None` when HEAD is detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let repo = self.lock()?;
        current_branch(&repo)
    }

    /// Names of the configured remotes
    pub fn remotes(&self) -> Result<Vec<String>> {
        let repo = self.lock()?;
        let remotes = repo.remotes()?;
        Ok(remotes.iter().flatten().map(str::to_string).collect())
    }

    /// Upstream of the current branch as (remote, branch), if configured
    pub fn upstream(&self) -> Result<Option<(String, String)>> {
        let repo = self.lock()?;
        let Some(branch) = current_branch(&repo)? else {
            return Ok(None);
        };

        let config = repo.config()?;
        let remote = config.get_string(&format!("branch.{}.remote", branch)).ok();
        let merge = config.get_string(&format!("branch.{}.merge", branch)).ok();

        Ok(match (remote, merge) {
            (Some(remote), Some(merge)) => {
                let name = merge.strip_prefix("refs/heads/").unwrap_or(&merge).to_string();
                Some((remote, name))
            }
            _ => None,
        })
    }

    /// Summary line of the commit `reference` resolves to
    pub fn commit_summary(&self, reference: &str) -> Result<String> {
        let repo = self.lock()?;
        let commit = repo.revparse_single(reference)?.peel_to_commit()?;
        Ok(commit.summary().unwrap_or_default().to_string())
    }

    fn lock(&self) -> Result<MutexGuard<'_, git2::Repository>> {
        self.repo
            .lock()
            .map_err(|_| Error::Other("Repository lock poisoned".to_string()))
    }
}

fn current_branch(repo: &git2::Repository) -> Result<Option<String>> {
    match repo.head() {
        Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
        Ok(_) => Ok(None),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
            // HEAD still names a branch, it just has no commits
            let head = repo.find_reference("HEAD")?;
            Ok(head
                .symbolic_target()
                .map(|t| t.strip_prefix("refs/heads/").unwrap_or(t).to_string()))
        }
        Err(e) => Err(Error::Git(e)),
    }
}

fn classify(status: Status) -> (bool, bool, bool) {
    let merge = status.is_conflicted();
    let index = !merge
        && status.intersects(
            Status::INDEX_NEW
                | Status::INDEX_MODIFIED
                | Status::INDEX_DELETED
                | Status::INDEX_RENAMED
                | Status::INDEX_TYPECHANGE,
        );
    let working = !merge
        && status.intersects(
            Status::WT_NEW
                | Status::WT_MODIFIED
                | Status::WT_DELETED
                | Status::WT_RENAMED
                | Status::WT_TYPECHANGE,
        );
    (working, index, merge)
}

#[async_trait]
impl Repository for GitRepo {
    fn id(&self) -> RepoId {
        self.id.clone()
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn state(&self) -> Result<RepositoryState> {
        let repo = self.lock()?;
        let head = current_branch(&repo)?;

        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts))?;

        let mut state = RepositoryState {
            head,
            ..Default::default()
        };
        for entry in statuses.iter() {
            let Some(rel) = entry.path() else {
                continue;
            };
            let path = self.root.join(rel);
            let (working, index, merge) = classify(entry.status());
            if working {
                state.working_tree_changes.push(Change::new(&path));
            }
            if index {
                state.index_changes.push(Change::new(&path));
            }
            if merge {
                state.merge_changes.push(Change::new(&path));
            }
        }

        Ok(state)
    }

    async fn commit(&self, message: &str, options: &CommitOptions) -> Result<()> {
        if options.all {
            run_git(&self.root, ["add", "--all"], &[]).await?;
        }

        let mut args = vec!["commit", "--allow-empty-message", "-m", message];
        if options.no_verify {
            args.push("--no-verify");
        }

        // Date overrides apply to this child process only
        let envs: Vec<(&str, String)> = match options.timestamp {
            Some(ts) => {
                let date = format!("@{} +0000", ts.timestamp());
                vec![("GIT_AUTHOR_DATE", date.clone()), ("GIT_COMMITTER_DATE", date)]
            }
            None => Vec::new(),
        };

        run_git(&self.root, &args, &envs).await?;
        tracing::info!(root = %self.root.display(), "Committed changes");
        Ok(())
    }

    async fn push(
        &self,
        remote: &str,
        branch: Option<&str>,
        set_upstream: bool,
        force: Option<ForcePushMode>,
    ) -> Result<()> {
        let mut args = vec!["push".to_string()];
        match force {
            Some(ForcePushMode::Force) => args.push("--force".to_string()),
            Some(ForcePushMode::ForceWithLease) => args.push("--force-with-lease".to_string()),
            None => {}
        }
        if set_upstream {
            args.push("--set-upstream".to_string());
        }
        args.push(remote.to_string());
        if let Some(branch) = branch {
            args.push(branch.to_string());
        }

        match run_git(&self.root, &args, &[]).await {
            Ok(_) => Ok(()),
            Err(Error::GitCommand { stderr, .. }) if is_push_rejection(&stderr) => {
                Err(Error::PushRejected(stderr))
            }
            Err(e) => Err(e),
        }
    }

    async fn pull(&self) -> Result<()> {
        run_git(&self.root, ["pull"], &[]).await?;
        Ok(())
    }

    async fn get_refs(&self) -> Result<Vec<Ref>> {
        let repo = self.lock()?;
        let mut refs = Vec::new();

        for reference in repo.references()? {
            let reference = reference?;
            let Some(full) = reference.name() else {
                continue;
            };

            let (ref_type, name) = if let Some(name) = full.strip_prefix("refs/heads/") {
                (RefType::Head, name)
            } else if let Some(name) = full.strip_prefix("refs/remotes/") {
                if name.ends_with("/HEAD") {
                    continue;
                }
                (RefType::RemoteHead, name)
            } else if let Some(name) = full.strip_prefix("refs/tags/") {
                (RefType::Tag, name)
            } else {
                continue;
            };

            let commit = reference
                .peel_to_commit()
                .ok()
                .map(|c| c.id().to_string());
            refs.push(Ref {
                name: name.to_string(),
                ref_type,
                commit,
            });
        }

        Ok(refs)
    }

    async fn diff_with_head(&self, path: &Path) -> Result<String> {
        let repo = self.lock()?;
        let rel = path.strip_prefix(&self.root).unwrap_or(path);

        let head_tree = match repo.head() {
            Ok(head) => Some(head.peel_to_tree()?),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => None,
            Err(e) => return Err(Error::Git(e)),
        };

        let mut opts = DiffOptions::new();
        opts.pathspec(rel)
            .include_untracked(true)
            .show_untracked_content(true)
            .recurse_untracked_dirs(true);
        let diff = repo.diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))?;

        let mut patch = String::new();
        diff.print(DiffFormat::Patch, |_, _, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                patch.push(line.origin());
            }
            patch.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;

        Ok(patch)
    }

    async fn checkout(&self, treeish: &str, paths: &[PathBuf]) -> Result<()> {
        let mut args = vec!["checkout".into(), treeish.into()];
        if !paths.is_empty() {
            args.push("--".into());
            args.extend(paths.iter().map(|p| p.as_os_str().to_os_string()));
        }
        run_git::<_, std::ffi::OsString>(&self.root, args, &[]).await?;
        Ok(())
    }

    async fn reset(&self, treeish: &str) -> Result<()> {
        run_git(&self.root, ["reset", "--soft", treeish], &[]).await?;
        Ok(())
    }

    async fn revert_no_commit(&self, treeish: &str) -> Result<()> {
        run_git(&self.root, ["revert", "--no-commit", treeish], &[]).await?;
        Ok(())
    }

    async fn create_branch(&self, name: &str, checkout: bool) -> Result<()> {
        if checkout {
            run_git(&self.root, ["checkout", "-b", name], &[]).await?;
        } else {
            let repo = self.lock()?;
            let head = repo.head()?.peel_to_commit()?;
            repo.branch(name, &head, false)?;
        }
        Ok(())
    }

    async fn delete_branch(&self, name: &str, force: bool) -> Result<()> {
        let repo = self.lock()?;
        let mut branch = repo.find_branch(name, BranchType::Local)?;
        if !force && !branch.is_head() {
            // Unforced deletion refuses branches not merged into HEAD
            let head = repo.head()?.peel_to_commit()?.id();
            if let Some(tip) = branch.get().target() {
                if tip != head && !repo.graph_descendant_of(head, tip)? {
                    return Err(Error::Other(format!(
                        "Branch '{}' is not fully merged",
                        name
                    )));
                }
            }
        }
        branch.delete()?;
        Ok(())
    }
}
