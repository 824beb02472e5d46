//! Push and pull against the remote
//!
//! Both operations are skipped silently when the repository has no
//! remote-tracking refs. Callers that are part of a commit cycle already
//! hold the cycle permit; interval timers take it themselves.

use std::sync::Arc;

use crate::config::{AutoPull, PushMode, SettingsStore};
use crate::git::{ForcePushMode, RefType, Repository};
use crate::interact::Interaction;
use crate::session::{Activity, ActivationState};
use crate::{Error, Result};

/// Remote used when `origin` has tracking refs
pub const DEFAULT_REMOTE: &str = "origin";

/// What a push ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// No remote-tracking refs, nothing attempted
    NoRemote,
    Pushed,
    /// Rejected, then overwritten with the user's consent
    Forced,
    /// Rejected and the user declined to force
    Declined,
}

/// What a pull ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    NoRemote,
    Pulled,
}

/// Coordinates push and pull for one repository
pub struct SyncCoordinator {
    repo: Arc<dyn Repository>,
    state: Arc<ActivationState>,
    settings: Arc<SettingsStore>,
    interaction: Arc<dyn Interaction>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("repo", &self.repo.id())
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    pub fn new(
        repo: Arc<dyn Repository>,
        state: Arc<ActivationState>,
        settings: Arc<SettingsStore>,
        interaction: Arc<dyn Interaction>,
    ) -> Self {
        Self {
            repo,
            state,
            settings,
            interaction,
        }
    }

    /// Remote to push to, if any remote-tracking ref exists
    ///
    /// Prefers `origin`; otherwise the remote of the first tracking ref.
    pub async fn remote_name(&self) -> Result<Option<String>> {
        let refs = self.repo.get_refs().await?;
        let remotes: Vec<&str> = refs
            .iter()
            .filter(|r| r.ref_type == RefType::RemoteHead)
            .filter_map(|r| r.name.split('/').next())
            .collect();

        if remotes.contains(&DEFAULT_REMOTE) {
            return Ok(Some(DEFAULT_REMOTE.to_string()));
        }
        Ok(remotes.first().map(|r| r.to_string()))
    }

    /// Whether the repository has at least one remote-tracking ref
    pub async fn has_remotes(&self) -> Result<bool> {
        Ok(self.remote_name().await?.is_some())
    }

    /// Push the current branch
    ///
    /// `force` demands an unconditional force push regardless of the
    /// configured push mode.
    pub async fn push(&self, force: bool) -> Result<PushOutcome> {
        let Some(remote) = self.remote_name().await? else {
            tracing::debug!("No remotes found, skipping push");
            return Ok(PushOutcome::NoRemote);
        };

        let _pushing = self.state.begin(Activity::Pushing);
        let config = self.settings.snapshot()?;

        if config.auto_pull == AutoPull::OnPush {
            self.pull().await?;
        }

        let branch = self.repo.state().await?.head;
        let mode = if force {
            Some(ForcePushMode::Force)
        } else {
            match config.push_mode {
                PushMode::Push => None,
                PushMode::ForcePush => Some(ForcePushMode::Force),
                PushMode::ForcePushWithLease => Some(ForcePushMode::ForceWithLease),
            }
        };

        tracing::debug!(remote = %remote, branch = ?branch, mode = ?mode, "Pushing changes to remote");
        match self.repo.push(&remote, branch.as_deref(), false, mode).await {
            Ok(()) => {
                tracing::info!(remote = %remote, "Changes pushed to remote");
                Ok(PushOutcome::Pushed)
            }
            Err(Error::PushRejected(detail)) => {
                tracing::warn!(remote = %remote, detail = %detail, "Push rejected by remote");
                let branch_label = branch.as_deref().unwrap_or("HEAD");
                if !self
                    .interaction
                    .confirm_force_push(&remote, branch_label)
                    .await
                {
                    return Ok(PushOutcome::Declined);
                }

                self.repo
                    .push(&remote, branch.as_deref(), false, Some(ForcePushMode::Force))
                    .await?;
                tracing::info!(remote = %remote, "Force pushed changes to remote");
                Ok(PushOutcome::Forced)
            }
            Err(e) => Err(e),
        }
    }

    /// Pull remote changes into the current branch
    pub async fn pull(&self) -> Result<PullOutcome> {
        if !self.has_remotes().await? {
            tracing::debug!("No remotes found, skipping pull");
            return Ok(PullOutcome::NoRemote);
        }

        let _pulling = self.state.begin(Activity::Pulling);
        tracing::debug!("Pulling remote changes");
        self.repo.pull().await?;
        tracing::info!("Remote changes pulled");
        Ok(PullOutcome::Pulled)
    }
}
