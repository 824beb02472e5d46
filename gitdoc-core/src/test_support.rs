//! In-memory collaborators for unit tests

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use crate::ai::{ChatMessage, LanguageModel, ModelInfo, ModelProvider, TextStream};
use crate::diagnostics::{DiagnosticMap, DiagnosticsProvider};
use crate::git::{
    Change, CommitOptions, ForcePushMode, Ref, RefType, RepoId, Repository, RepositoryState,
};
use crate::interact::Interaction;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushCall {
    pub remote: String,
    pub branch: Option<String>,
    pub force: Option<ForcePushMode>,
}

#[derive(Debug, Default)]
struct RepoInner {
    state: RepositoryState,
    refs: Vec<Ref>,
    diffs: HashMap<PathBuf, String>,
    failing_diffs: HashSet<PathBuf>,
    commits: Vec<(String, CommitOptions)>,
    pushes: Vec<PushCall>,
    pulls: usize,
    rejections: usize,
    fail_pulls: bool,
    commit_failures: usize,
    commit_delay: Option<Duration>,
    push_delay: Option<Duration>,
    checkouts: Vec<(String, Vec<PathBuf>)>,
    resets: Vec<String>,
    reverts: Vec<String>,
    branches: Vec<String>,
}

/// Repository that records every call
#[derive(Debug)]
pub struct FakeRepository {
    root: PathBuf,
    inner: Mutex<RepoInner>,
}

impl FakeRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let inner = RepoInner {
            state: RepositoryState {
                head: Some("main".to_string()),
                ..Default::default()
            },
            refs: vec![Ref::new("main", RefType::Head)],
            ..Default::default()
        };
        Self {
            root: root.into(),
            inner: Mutex::new(inner),
        }
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, RepoInner> {
        self.inner.lock().unwrap()
    }

    pub fn set_head(&self, head: Option<&str>) {
        self.inner().state.head = head.map(str::to_string);
    }

    /// Working-tree changes, relative to the root
    pub fn set_changes(&self, relative: &[&str]) {
        let changes = relative.iter().map(|p| Change::new(self.root.join(p))).collect();
        self.inner().state.working_tree_changes = changes;
    }

    pub fn set_index_changes(&self, relative: &[&str]) {
        let changes = relative.iter().map(|p| Change::new(self.root.join(p))).collect();
        self.inner().state.index_changes = changes;
    }

    pub fn set_refs(&self, refs: Vec<Ref>) {
        self.inner().refs = refs;
    }

    pub fn set_diff(&self, path: &Path, diff: &str) {
        self.inner().diffs.insert(path.to_path_buf(), diff.to_string());
    }

    pub fn fail_diff(&self, path: &Path) {
        self.inner().failing_diffs.insert(path.to_path_buf());
    }

    /// Fail the next `count` commits
    pub fn fail_commits(&self, count: usize) {
        self.inner().commit_failures = count;
    }

    pub fn set_commit_delay(&self, delay: Duration) {
        self.inner().commit_delay = Some(delay);
    }

    /// Delay every push before it is recorded
    pub fn set_push_delay(&self, delay: Duration) {
        self.inner().push_delay = Some(delay);
    }

    /// Reject the next `count` pushes as non-fast-forward
    pub fn reject_pushes(&self, count: usize) {
        self.inner().rejections = count;
    }

    pub fn fail_pulls(&self, fail: bool) {
        self.inner().fail_pulls = fail;
    }

    pub fn commits(&self) -> Vec<(String, CommitOptions)> {
        self.inner().commits.clone()
    }

    pub fn pushes(&self) -> Vec<PushCall> {
        self.inner().pushes.clone()
    }

    pub fn pull_count(&self) -> usize {
        self.inner().pulls
    }

    pub fn checkouts(&self) -> Vec<(String, Vec<PathBuf>)> {
        self.inner().checkouts.clone()
    }

    pub fn resets(&self) -> Vec<String> {
        self.inner().resets.clone()
    }

    pub fn reverts(&self) -> Vec<String> {
        self.inner().reverts.clone()
    }
}

#[async_trait]
impl Repository for FakeRepository {
    fn id(&self) -> RepoId {
        RepoId::new(self.root.to_string_lossy())
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn state(&self) -> Result<RepositoryState> {
        Ok(self.inner().state.clone())
    }

    async fn commit(&self, message: &str, options: &CommitOptions) -> Result<()> {
        let delay = self.inner().commit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner();
        if inner.commit_failures > 0 {
            inner.commit_failures -= 1;
            return Err(Error::GitCommand {
                command: "commit".to_string(),
                stderr: "simulated failure".to_string(),
            });
        }
        inner.commits.push((message.to_string(), options.clone()));
        inner.state.working_tree_changes.clear();
        inner.state.index_changes.clear();
        inner.state.merge_changes.clear();
        Ok(())
    }

    async fn push(
        &self,
        remote: &str,
        branch: Option<&str>,
        _set_upstream: bool,
        force: Option<ForcePushMode>,
    ) -> Result<()> {
        let delay = self.inner().push_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner();
        inner.pushes.push(PushCall {
            remote: remote.to_string(),
            branch: branch.map(str::to_string),
            force,
        });
        if inner.rejections > 0 {
            inner.rejections -= 1;
            return Err(Error::PushRejected("! [rejected] (fetch first)".to_string()));
        }
        Ok(())
    }

    async fn pull(&self) -> Result<()> {
        let mut inner = self.inner();
        if inner.fail_pulls {
            return Err(Error::GitCommand {
                command: "pull".to_string(),
                stderr: "CONFLICT".to_string(),
            });
        }
        inner.pulls += 1;
        Ok(())
    }

    async fn get_refs(&self) -> Result<Vec<Ref>> {
        Ok(self.inner().refs.clone())
    }

    async fn diff_with_head(&self, path: &Path) -> Result<String> {
        let inner = self.inner();
        if inner.failing_diffs.contains(path) {
            return Err(Error::Other("diff failed".to_string()));
        }
        Ok(inner.diffs.get(path).cloned().unwrap_or_default())
    }

    async fn checkout(&self, treeish: &str, paths: &[PathBuf]) -> Result<()> {
        let mut inner = self.inner();
        inner.checkouts.push((treeish.to_string(), paths.to_vec()));
        let changes = paths.iter().map(Change::new).collect();
        inner.state.working_tree_changes = changes;
        Ok(())
    }

    async fn reset(&self, treeish: &str) -> Result<()> {
        let mut inner = self.inner();
        inner.resets.push(treeish.to_string());
        let root = self.root.join("squashed");
        inner.state.index_changes = vec![Change::new(root)];
        Ok(())
    }

    async fn revert_no_commit(&self, treeish: &str) -> Result<()> {
        let mut inner = self.inner();
        inner.reverts.push(treeish.to_string());
        let root = self.root.join("reverted");
        inner.state.index_changes = vec![Change::new(root)];
        Ok(())
    }

    async fn create_branch(&self, name: &str, _checkout: bool) -> Result<()> {
        self.inner().branches.push(name.to_string());
        Ok(())
    }

    async fn delete_branch(&self, name: &str, _force: bool) -> Result<()> {
        self.inner().branches.retain(|b| b != name);
        Ok(())
    }
}

/// Interaction with a fixed force-push answer
#[derive(Debug, Default)]
pub struct ScriptedInteraction {
    confirm: bool,
    confirmations: AtomicUsize,
    warnings: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedInteraction {
    pub fn confirming(confirm: bool) -> Self {
        Self {
            confirm,
            ..Default::default()
        }
    }

    pub fn warnings(&self) -> Vec<(String, Option<String>)> {
        self.warnings.lock().unwrap().clone()
    }

    pub fn confirmations(&self) -> usize {
        self.confirmations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Interaction for ScriptedInteraction {
    async fn confirm_force_push(&self, _remote: &str, _branch: &str) -> bool {
        self.confirmations.fetch_add(1, Ordering::SeqCst);
        self.confirm
    }

    async fn warn(&self, message: &str, detail: Option<&str>) {
        self.warnings
            .lock()
            .unwrap()
            .push((message.to_string(), detail.map(str::to_string)));
    }
}

/// Diagnostics from a fixed map
#[derive(Debug, Default)]
pub struct StaticDiagnostics {
    map: DiagnosticMap,
    fail: bool,
    requested: Mutex<Vec<PathBuf>>,
}

impl StaticDiagnostics {
    pub fn new(map: DiagnosticMap) -> Self {
        Self {
            map,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Paths asked for in the last query
    pub fn requested(&self) -> Vec<PathBuf> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl DiagnosticsProvider for StaticDiagnostics {
    async fn diagnostics(&self, paths: &[PathBuf]) -> Result<DiagnosticMap> {
        *self.requested.lock().unwrap() = paths.to_vec();
        if self.fail {
            return Err(Error::Diagnostics("checker crashed".to_string()));
        }
        Ok(self
            .map
            .iter()
            .filter(|(path, _)| paths.contains(path))
            .map(|(p, d)| (p.clone(), d.clone()))
            .collect())
    }
}

/// Model provider with a canned reply
#[derive(Debug, Default)]
pub struct FakeModelProvider {
    reply: Option<Vec<String>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl FakeModelProvider {
    pub fn with_reply<S: Into<String>>(parts: Vec<S>) -> Self {
        Self {
            reply: Some(parts.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// No model of any family
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    pub fn request_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

struct FakeModel {
    info: ModelInfo,
    reply: Vec<String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl LanguageModel for FakeModel {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    async fn send_request(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let prompt = messages.iter().map(|m| m.content.clone()).collect::<Vec<_>>().join("\n");
        self.prompts.lock().unwrap().push(prompt);
        let parts: Vec<Result<String>> = self.reply.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(parts)))
    }
}

#[async_trait]
impl ModelProvider for FakeModelProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn select_models(&self, family: &str) -> Result<Vec<Arc<dyn LanguageModel>>> {
        let Some(reply) = &self.reply else {
            return Ok(Vec::new());
        };
        Ok(vec![Arc::new(FakeModel {
            info: ModelInfo {
                id: family.to_string(),
                name: family.to_string(),
                family: family.to_string(),
            },
            reply: reply.clone(),
            prompts: self.prompts.clone(),
        })])
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(Vec::new())
    }
}
