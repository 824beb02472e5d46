//! Watch command - keep a watch session running while GitDoc is enabled

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use gitdoc_core::{should_watch, Interaction, WatchSession};

use super::{interaction, Workspace};

/// Watch the repository and auto-commit changes
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Seconds between checks of the settings and the checked-out branch
    #[arg(long, default_value_t = 2)]
    poll_secs: u64,
}

impl Default for WatchArgs {
    fn default() -> Self {
        Self { poll_secs: 2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Keep,
    Start,
    Restart,
    Stop,
}

/// What to do given the running session (if any) and the branch to watch
fn plan(running: Option<bool>, target: Option<&str>) -> Action {
    match (running, target) {
        (None, None) => Action::Keep,
        (None, Some(_)) => Action::Start,
        (Some(_), None) => Action::Stop,
        (Some(true), Some(_)) => Action::Restart,
        (Some(false), Some(_)) => Action::Keep,
    }
}

struct Supervisor<'a> {
    workspace: &'a Workspace,
    interaction: Arc<dyn Interaction>,
    session: Option<WatchSession>,
}

impl Supervisor<'_> {
    async fn reconcile(&mut self) -> anyhow::Result<()> {
        let config = self.workspace.settings.snapshot()?;
        let mut target = should_watch(self.workspace.repo.as_ref(), &config).await?;

        // The breaker disables the session's state before the file catches up
        if let Some(session) = &self.session {
            if !session.orchestrator().state().is_enabled() {
                target = None;
            }
        }

        let running = self
            .session
            .as_ref()
            .map(|s| target.as_deref().is_some_and(|b| s.needs_restart(b, &config)));

        match plan(running, target.as_deref()) {
            Action::Keep => {}
            Action::Stop => {
                if let Some(session) = self.session.take() {
                    session.stop();
                }
            }
            Action::Start | Action::Restart => {
                if let Some(session) = self.session.take() {
                    tracing::info!("Settings or branch changed, restarting watcher");
                    session.stop();
                }
                if let Some(branch) = target {
                    let orchestrator =
                        Arc::new(self.workspace.orchestrator(&config, self.interaction.clone()));
                    self.session = Some(WatchSession::start(orchestrator, &config, branch)?);
                }
            }
        }

        Ok(())
    }

    async fn shutdown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let orchestrator = session.orchestrator().clone();
        session.stop();

        let commit_on_close = self
            .workspace
            .settings
            .snapshot()
            .map(|c| c.commit_on_close)
            .unwrap_or(false);
        if commit_on_close && orchestrator.state().is_enabled() {
            tracing::info!("Committing pending changes before exit");
            if let Err(e) = orchestrator.commit(None).await {
                tracing::warn!(error = %e, "Final commit failed");
            }
        }
    }
}

impl WatchArgs {
    /// Execute the watch command
    pub async fn execute(&self, workspace: &Workspace) -> anyhow::Result<()> {
        let mut supervisor = Supervisor {
            workspace,
            interaction: interaction::for_stdin(),
            session: None,
        };

        supervisor.reconcile().await?;
        if supervisor.session.is_none() {
            println!("GitDoc is not active for this repository; waiting (run `gitdoc enable`)");
        }

        let mut poll = tokio::time::interval(Duration::from_secs(self.poll_secs.max(1)));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, shutting down");
                    break;
                }
                _ = poll.tick() => {
                    if let Err(e) = supervisor.reconcile().await {
                        tracing::warn!(error = %e, "Failed to refresh watch state");
                    }
                }
            }
        }

        supervisor.shutdown().await;
        Ok(())
    }
}
