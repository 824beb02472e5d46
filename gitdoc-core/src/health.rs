//! Circuit breaker for repeated commit failures
//!
//! One failure only marks the last commit as unsuccessful. A second failure
//! with no success in between disables the session for good: the enabled
//! flag is cleared here and in the persisted settings, every in-flight flag
//! is dropped, and the user is warned once. Re-enabling is a manual action.

use std::sync::Arc;

use crate::config::SettingsStore;
use crate::interact::Interaction;
use crate::session::ActivationState;

const BREAKER_MESSAGE: &str = "GitDoc failed to commit twice in a row and has been disabled.";
const BREAKER_DETAIL: &str =
    "Check the logs for the underlying error, then run `gitdoc enable` to resume.";

/// Result of recording a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureVerdict {
    /// First failure in a row, still armed
    Armed,
    /// Second failure in a row, session disabled
    Tripped,
}

/// Tracks consecutive commit failures for one session
pub struct HealthTracker {
    state: Arc<ActivationState>,
    settings: Arc<SettingsStore>,
    interaction: Arc<dyn Interaction>,
}

impl std::fmt::Debug for HealthTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthTracker")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl HealthTracker {
    pub fn new(
        state: Arc<ActivationState>,
        settings: Arc<SettingsStore>,
        interaction: Arc<dyn Interaction>,
    ) -> Self {
        Self {
            state,
            settings,
            interaction,
        }
    }

    /// A commit went through
    pub fn record_success(&self) {
        self.state.swap_last_commit_successful(true);
    }

    /// A commit attempt failed
    pub async fn record_failure(&self) -> FailureVerdict {
        let previous_ok = self.state.swap_last_commit_successful(false);
        if previous_ok {
            tracing::debug!("First commit failure, staying armed");
            return FailureVerdict::Armed;
        }

        self.trip().await;
        FailureVerdict::Tripped
    }

    async fn trip(&self) {
        let was_enabled = self.state.is_enabled();
        self.state.set_enabled(false);
        self.state.clear_activity();
        tracing::warn!("Second consecutive commit failure, disabling auto-commit");

        if let Err(e) = self.settings.set_enabled(false) {
            tracing::error!(error = %e, "Failed to persist disabled setting");
        }

        if was_enabled {
            self.interaction
                .warn(BREAKER_MESSAGE, Some(BREAKER_DETAIL))
                .await;
        }
    }
}
