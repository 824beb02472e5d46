//! File system watcher and watch sessions
//!
//! A [`WatchSession`] lives from start-watching to stop-watching. It owns
//! the notify watcher, the debounce registry and the interval tasks, and
//! tears all of them down in [`WatchSession::stop`] (or on drop), so no
//! timer outlives the session that created it.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{AutoPull, AutoPush, Config};
use crate::debounce::Debouncer;
use crate::git::{RefType, RepoId, Repository};
use crate::orchestrator::CommitOrchestrator;
use crate::Result;

/// Branch to watch, or `None` when auto-commit should not run
///
/// Uses the checked-out branch, falling back to the first local branch
/// when HEAD is detached.
pub async fn should_watch(repo: &dyn Repository, config: &Config) -> Result<Option<String>> {
    if !config.enabled {
        return Ok(None);
    }

    let branch = match repo.state().await?.head {
        Some(head) => Some(head),
        None => repo
            .get_refs()
            .await?
            .into_iter()
            .find(|r| r.ref_type == RefType::Head)
            .map(|r| r.name),
    };

    let watch = branch.filter(|b| !config.exclude_branches.iter().any(|e| e == b));
    tracing::debug!(branch = ?watch, "GitDoc should {}be enabled", if watch.is_some() { "" } else { "not " });
    Ok(watch)
}

/// Whether a changed path should trigger a commit
///
/// Everything in the working tree counts. Inside `.git` only the index,
/// HEAD and refs do, which covers staging, commits and branch switches.
pub fn is_relevant_path(path: &Path) -> bool {
    let mut components = path.components();
    if !components.any(|c| c == Component::Normal(".git".as_ref())) {
        return true;
    }

    match components.next() {
        Some(Component::Normal(name)) => name == "index" || name == "HEAD" || name == "refs",
        _ => false,
    }
}

fn relevant_paths(event: &Event) -> Vec<PathBuf> {
    if matches!(event.kind, EventKind::Access(_)) {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .filter(|p| is_relevant_path(p))
        .cloned()
        .collect()
}

/// Settings that shape a running session; changing any requires a restart
#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionShape {
    auto_commit_delay: Duration,
    auto_push: AutoPush,
    auto_push_delay: Duration,
    auto_pull: AutoPull,
    auto_pull_delay: Duration,
}

impl SessionShape {
    fn of(config: &Config) -> Self {
        Self {
            auto_commit_delay: config.auto_commit_delay,
            auto_push: config.auto_push,
            auto_push_delay: config.auto_push_delay,
            auto_pull: config.auto_pull,
            auto_pull_delay: config.auto_pull_delay,
        }
    }
}

/// One running watch session for a repository
pub struct WatchSession {
    orchestrator: Arc<CommitOrchestrator>,
    debouncer: Arc<Debouncer<RepoId>>,
    watcher: Option<RecommendedWatcher>,
    tasks: Vec<JoinHandle<()>>,
    branch: String,
    shape: SessionShape,
}

impl std::fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession")
            .field("branch", &self.branch)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

impl WatchSession {
    /// Start watching the orchestrator's repository
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        orchestrator: Arc<CommitOrchestrator>,
        config: &Config,
        branch: impl Into<String>,
    ) -> Result<Self> {
        let branch = branch.into();
        let root = orchestrator.repository().root().to_path_buf();
        tracing::info!(root = %root.display(), branch = %branch, "Starting watcher");

        let debouncer = Arc::new(Debouncer::new());
        let (tx, rx) = mpsc::unbounded_channel::<Vec<PathBuf>>();

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    let paths = relevant_paths(&event);
                    if !paths.is_empty() {
                        let _ = tx.send(paths);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Watch error"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        let mut session = Self {
            orchestrator,
            debouncer,
            watcher: Some(watcher),
            tasks: Vec::new(),
            branch,
            shape: SessionShape::of(config),
        };

        session.spawn_event_loop(rx);
        session.spawn_intervals(config);
        if config.pull_on_open {
            session.spawn_pull_on_open();
        }

        tracing::info!("Watcher started");
        Ok(session)
    }

    /// Branch this session was started for
    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn orchestrator(&self) -> &Arc<CommitOrchestrator> {
        &self.orchestrator
    }

    /// Whether the session no longer matches `branch` and `config`
    pub fn needs_restart(&self, branch: &str, config: &Config) -> bool {
        self.branch != branch || self.shape != SessionShape::of(config)
    }

    /// Debounce a commit as if a file had changed
    pub fn trigger(&self) {
        schedule_commit(&self.debouncer, &self.orchestrator, self.shape.auto_commit_delay);
    }

    /// Number of debounced commits not yet fired
    pub fn pending_commits(&self) -> usize {
        self.debouncer.pending()
    }

    /// Stop watching and cancel every timer the session started
    pub fn stop(mut self) {
        self.teardown();
        tracing::info!(branch = %self.branch, "Watcher stopped");
    }

    fn teardown(&mut self) {
        self.watcher = None;
        self.debouncer.shutdown();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    fn spawn_event_loop(&mut self, mut rx: mpsc::UnboundedReceiver<Vec<PathBuf>>) {
        let debouncer = self.debouncer.clone();
        let orchestrator = self.orchestrator.clone();
        let delay = self.shape.auto_commit_delay;

        self.tasks.push(tokio::spawn(async move {
            while let Some(paths) = rx.recv().await {
                tracing::trace!(?paths, "Repository changed");
                schedule_commit(&debouncer, &orchestrator, delay);
            }
        }));
    }

    fn spawn_intervals(&mut self, config: &Config) {
        if config.auto_push == AutoPush::AfterDelay {
            let orchestrator = self.orchestrator.clone();
            self.tasks.push(spawn_interval(config.auto_push_delay, move || {
                let orchestrator = orchestrator.clone();
                async move {
                    let state = orchestrator.state();
                    let Some(_cycle) = state.try_begin_cycle() else {
                        tracing::debug!("Cycle in flight, skipping interval push");
                        return;
                    };
                    if let Err(e) = orchestrator.sync().push(false).await {
                        tracing::error!(error = %e, "Interval push failed");
                    }
                }
            }));
        }

        if config.auto_pull == AutoPull::AfterDelay {
            let orchestrator = self.orchestrator.clone();
            self.tasks.push(spawn_interval(config.auto_pull_delay, move || {
                let orchestrator = orchestrator.clone();
                async move {
                    let state = orchestrator.state();
                    let Some(_cycle) = state.try_begin_cycle() else {
                        tracing::debug!("Cycle in flight, skipping interval pull");
                        return;
                    };
                    if let Err(e) = orchestrator.sync().pull().await {
                        tracing::error!(error = %e, "Interval pull failed");
                    }
                }
            }));
        }
    }

    fn spawn_pull_on_open(&mut self) {
        let orchestrator = self.orchestrator.clone();
        // Detached: stopping the session must not interrupt a running pull
        tokio::spawn(async move {
            let state = orchestrator.state();
            let Some(_cycle) = state.try_begin_cycle() else {
                return;
            };
            if let Err(e) = orchestrator.sync().pull().await {
                tracing::error!(error = %e, "Pull on open failed");
            }
        });
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn schedule_commit(
    debouncer: &Debouncer<RepoId>,
    orchestrator: &Arc<CommitOrchestrator>,
    delay: Duration,
) {
    let orchestrator = orchestrator.clone();
    debouncer.schedule(orchestrator.repository().id(), delay, move || async move {
        match orchestrator.commit(None).await {
            Ok(outcome) => tracing::debug!(?outcome, "Debounced commit finished"),
            Err(e) => tracing::error!(error = %e, "Debounced commit failed"),
        }
    });
}

/// Run `tick` every `period`, first after one full period
///
/// Each tick runs on its own task, so aborting the returned handle stops
/// future ticks without cancelling one already in progress.
fn spawn_interval<F, Fut>(period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            tokio::spawn(tick());
        }
    })
}
