//! The commit cycle
//!
//! [`CommitOrchestrator::commit`] is the single guarded entry point used by
//! the debounce timer and by manual commands alike. A call either takes the
//! cycle permit or returns [`CommitOutcome::Busy`] immediately; calls are
//! dropped, never queued.
//!
//! A cycle collects the pending changes, filters them, gates on
//! diagnostics, builds a message (explicit, AI or timestamp), commits
//! everything, then chains the on-commit push and pull. Failures feed the
//! circuit breaker in [`crate::health`] and are returned to the caller.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use crate::ai::{self, ModelProvider};
use crate::config::{AutoPull, AutoPush, Config, SettingsStore, ValidationLevel};
use crate::diagnostics::{has_blocking, DiagnosticsProvider, Severity};
use crate::filter::FileFilter;
use crate::git::{CommitOptions, Repository};
use crate::health::HealthTracker;
use crate::interact::Interaction;
use crate::session::{Activity, ActivationState, FlagGuard};
use crate::sync::SyncCoordinator;
use crate::timestamp::format_message;
use crate::{Error, Result};

/// How a commit attempt ended, when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Auto-commit is disabled
    Disabled,
    /// Another cycle holds the permit
    Busy,
    /// Nothing pending
    NoChanges,
    /// Pending changes, none of them eligible
    NothingMatched,
    /// Blocking diagnostics on an eligible path
    ValidationFailed { paths: Vec<PathBuf> },
    Committed { message: String },
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }
}

/// Runs commit cycles for one repository
pub struct CommitOrchestrator {
    repo: Arc<dyn Repository>,
    state: Arc<ActivationState>,
    settings: Arc<SettingsStore>,
    diagnostics: Arc<dyn DiagnosticsProvider>,
    interaction: Arc<dyn Interaction>,
    model_provider: Option<Arc<dyn ModelProvider>>,
    sync: Arc<SyncCoordinator>,
    health: HealthTracker,
}

impl std::fmt::Debug for CommitOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitOrchestrator")
            .field("repo", &self.repo.id())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl CommitOrchestrator {
    pub fn new(
        repo: Arc<dyn Repository>,
        state: Arc<ActivationState>,
        settings: Arc<SettingsStore>,
        diagnostics: Arc<dyn DiagnosticsProvider>,
        interaction: Arc<dyn Interaction>,
    ) -> Self {
        let sync = Arc::new(SyncCoordinator::new(
            repo.clone(),
            state.clone(),
            settings.clone(),
            interaction.clone(),
        ));
        let health = HealthTracker::new(state.clone(), settings.clone(), interaction.clone());

        Self {
            repo,
            state,
            settings,
            diagnostics,
            interaction,
            model_provider: None,
            sync,
            health,
        }
    }

    /// Use a fixed model provider instead of the configured one
    pub fn with_model_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.model_provider = Some(provider);
        self
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    pub fn state(&self) -> &Arc<ActivationState> {
        &self.state
    }

    pub fn sync(&self) -> &Arc<SyncCoordinator> {
        &self.sync
    }

    /// Run one commit cycle
    ///
    /// An explicit `message` is used verbatim and skips AI generation.
    pub async fn commit(&self, message: Option<&str>) -> Result<CommitOutcome> {
        if !self.state.is_enabled() {
            tracing::debug!("Auto-commit disabled, skipping commit");
            return Ok(CommitOutcome::Disabled);
        }

        let Some(_cycle) = self.state.try_begin_cycle() else {
            tracing::debug!("Commit cycle already in flight, skipping");
            return Ok(CommitOutcome::Busy);
        };

        let committing = self.state.begin(Activity::Committing);
        match self.run_cycle(message, committing).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(error = %e, "Commit cycle failed");
                self.health.record_failure().await;
                Err(e)
            }
        }
    }

    async fn run_cycle(
        &self,
        message: Option<&str>,
        committing: FlagGuard<'_>,
    ) -> Result<CommitOutcome> {
        let config = self.settings.snapshot()?;
        let root = self.repo.root().to_path_buf();

        tracing::debug!("Committing changes");
        let changed = self.repo.state().await?.all_changed_paths();
        if changed.is_empty() {
            tracing::debug!("No changes to commit");
            return Ok(CommitOutcome::NoChanges);
        }

        let filter = FileFilter::from_config(&config)?;
        let eligible = filter.select(&changed, &root);
        if eligible.is_empty() {
            tracing::debug!(changed = changed.len(), "No changes matched the file filters");
            return Ok(CommitOutcome::NothingMatched);
        }

        if let Some(outcome) = self.validate(&config, &eligible).await? {
            return Ok(outcome);
        }

        let now = Utc::now();
        let message = match message {
            Some(explicit) => explicit.to_string(),
            None => self.build_message(&config, &eligible, now).await?,
        };

        let options = CommitOptions {
            all: true,
            no_verify: config.no_verify,
            timestamp: Some(now),
        };
        self.repo.commit(&message, &options).await?;
        self.health.record_success();
        drop(committing);
        tracing::info!(message = %message, files = eligible.len(), "Changes committed");

        if config.auto_push == AutoPush::OnCommit {
            self.sync.push(false).await?;
        }
        if config.auto_pull == AutoPull::OnCommit {
            self.sync.pull().await?;
        }

        Ok(CommitOutcome::Committed { message })
    }

    async fn validate(&self, config: &Config, eligible: &[PathBuf]) -> Result<Option<CommitOutcome>> {
        let threshold = match config.commit_validation_level {
            ValidationLevel::None => return Ok(None),
            ValidationLevel::Warning => Severity::Warning,
            ValidationLevel::Error => Severity::Error,
        };

        let diagnostics = self.diagnostics.diagnostics(eligible).await?;
        if !has_blocking(&diagnostics, threshold) {
            return Ok(None);
        }

        let mut paths: Vec<PathBuf> = diagnostics
            .iter()
            .filter(|(_, d)| d.iter().any(|d| d.severity >= threshold))
            .map(|(p, _)| p.clone())
            .collect();
        paths.sort();
        tracing::warn!(?paths, ?threshold, "Blocking diagnostics found, skipping commit");
        Ok(Some(CommitOutcome::ValidationFailed { paths }))
    }

    async fn build_message(
        &self,
        config: &Config,
        eligible: &[PathBuf],
        now: chrono::DateTime<Utc>,
    ) -> Result<String> {
        let fallback = || {
            format_message(
                now,
                &config.commit_message_format,
                config.time_zone.as_deref(),
            )
        };

        if !config.ai.enabled {
            return fallback();
        }

        let provider = match &self.model_provider {
            Some(provider) => provider.clone(),
            None => ai::provider_from_config(&config.ai),
        };

        match ai::generate_commit_message(self.repo.as_ref(), provider.as_ref(), &config.ai, eligible)
            .await
        {
            Ok(text) if !text.trim().is_empty() => Ok(text),
            Ok(_) => {
                tracing::debug!("AI returned an empty message, using timestamp");
                fallback()
            }
            Err(Error::ModelUnavailable(family)) => {
                if let Err(e) = self.settings.set_ai_enabled(false) {
                    tracing::error!(error = %e, "Failed to disable AI commit messages");
                }
                self.interaction
                    .warn(
                        &format!(
                            "AI model not found, unable to generate commit message with {}",
                            family
                        ),
                        Some("AI commit messages have been disabled. Check the provider setup, then re-enable ai.enabled."),
                    )
                    .await;
                Err(Error::ModelUnavailable(family))
            }
            Err(e) => {
                tracing::warn!(error = %e, "AI commit message failed, using timestamp");
                fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PushMode;
    use crate::diagnostics::{Diagnostic, DiagnosticMap};
    use crate::git::{Ref, RefType};
    use crate::test_support::{
        FakeModelProvider, FakeRepository, ScriptedInteraction, StaticDiagnostics,
    };
    use std::time::Duration;

    const ROOT: &str = "/work/notes";

    struct Fixture {
        repo: Arc<FakeRepository>,
        state: Arc<ActivationState>,
        settings: Arc<SettingsStore>,
        interaction: Arc<ScriptedInteraction>,
        orchestrator: CommitOrchestrator,
    }

    fn base_config() -> Config {
        Config {
            enabled: true,
            commit_validation_level: ValidationLevel::None,
            auto_push: AutoPush::Off,
            auto_pull: AutoPull::Off,
            ..Default::default()
        }
    }

    fn fixture_with(config: Config, diagnostics: StaticDiagnostics) -> Fixture {
        let repo = Arc::new(FakeRepository::new(ROOT));
        let state = Arc::new(ActivationState::new(config.enabled));
        let settings = Arc::new(SettingsStore::in_memory(config));
        let interaction = Arc::new(ScriptedInteraction::confirming(false));
        let orchestrator = CommitOrchestrator::new(
            repo.clone(),
            state.clone(),
            settings.clone(),
            Arc::new(diagnostics),
            interaction.clone(),
        );
        Fixture {
            repo,
            state,
            settings,
            interaction,
            orchestrator,
        }
    }

    fn fixture(config: Config) -> Fixture {
        fixture_with(config, StaticDiagnostics::default())
    }

    fn is_iso_date(s: &str) -> bool {
        let b = s.as_bytes();
        b.len() == 10
            && b[4] == b'-'
            && b[7] == b'-'
            && b.iter()
                .enumerate()
                .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit())
    }

    #[tokio::test]
    async fn test_commits_with_timestamp_message() {
        let mut config = base_config();
        config.commit_message_format = "yyyy-LL-dd".to_string();
        let f = fixture(config);
        f.repo.set_changes(&["docs/readme.md"]);

        let outcome = f.orchestrator.commit(None).await.unwrap();
        assert!(outcome.is_committed());

        let commits = f.repo.commits();
        assert_eq!(commits.len(), 1);
        let (message, options) = &commits[0];
        assert!(is_iso_date(message), "unexpected message {message:?}");
        assert!(options.all);
        assert!(!options.no_verify);
        assert!(options.timestamp.is_some());
        assert!(f.state.last_commit_successful());
        assert!(!f.state.is_busy());
        assert!(!f.state.is_committing());
    }

    #[tokio::test]
    async fn test_no_changes_is_noop() {
        let f = fixture(base_config());
        assert_eq!(f.orchestrator.commit(None).await.unwrap(), CommitOutcome::NoChanges);
        assert!(f.repo.commits().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let mut config = base_config();
        config.enabled = false;
        let f = fixture(config);
        f.repo.set_changes(&["a.md"]);

        assert_eq!(f.orchestrator.commit(None).await.unwrap(), CommitOutcome::Disabled);
        assert!(f.repo.commits().is_empty());
    }

    #[tokio::test]
    async fn test_filters_decide_whether_to_commit() {
        let mut config = base_config();
        config.file_pattern = "**/*.md".to_string();
        config.filter.exclude = vec!["**/drafts/**".to_string()];
        config.commit_validation_level = ValidationLevel::Error;
        let diagnostics = StaticDiagnostics::default();
        let f = fixture_with(config, diagnostics);

        f.repo.set_changes(&["drafts/todo.md", "image.png"]);
        assert_eq!(
            f.orchestrator.commit(None).await.unwrap(),
            CommitOutcome::NothingMatched
        );

        f.repo.set_changes(&["notes.md", "drafts/todo.md"]);
        assert!(f.orchestrator.commit(None).await.unwrap().is_committed());
    }

    #[tokio::test]
    async fn test_diagnostics_queried_for_eligible_paths_only() {
        let mut config = base_config();
        config.file_pattern = "**/*.md".to_string();
        config.filter.exclude = vec!["**/drafts/**".to_string()];
        config.commit_validation_level = ValidationLevel::Error;
        let repo = Arc::new(FakeRepository::new(ROOT));
        let diagnostics = Arc::new(StaticDiagnostics::default());
        let orchestrator = CommitOrchestrator::new(
            repo.clone(),
            Arc::new(ActivationState::new(true)),
            Arc::new(SettingsStore::in_memory(config)),
            diagnostics.clone(),
            Arc::new(ScriptedInteraction::default()),
        );

        repo.set_changes(&["notes.md", "drafts/todo.md"]);
        orchestrator.commit(None).await.unwrap();
        assert_eq!(diagnostics.requested(), vec![PathBuf::from(ROOT).join("notes.md")]);
    }

    #[tokio::test]
    async fn test_error_diagnostic_blocks_commit() {
        let mut config = base_config();
        config.commit_validation_level = ValidationLevel::Error;
        let path = PathBuf::from(ROOT).join("a.md");
        let mut map = DiagnosticMap::new();
        map.insert(path.clone(), vec![Diagnostic::new(Severity::Error, "broken link")]);
        let f = fixture_with(config, StaticDiagnostics::new(map));
        f.repo.set_changes(&["a.md"]);

        let outcome = f.orchestrator.commit(None).await.unwrap();
        assert_eq!(outcome, CommitOutcome::ValidationFailed { paths: vec![path] });
        assert!(f.repo.commits().is_empty());
        assert!(f.state.last_commit_successful());
        assert!(!f.state.is_busy());
    }

    #[tokio::test]
    async fn test_warning_threshold() {
        let path = PathBuf::from(ROOT).join("a.md");
        let mut map = DiagnosticMap::new();
        map.insert(path, vec![Diagnostic::new(Severity::Warning, "long line")]);

        let mut config = base_config();
        config.commit_validation_level = ValidationLevel::Error;
        let f = fixture_with(config.clone(), StaticDiagnostics::new(map.clone()));
        f.repo.set_changes(&["a.md"]);
        assert!(f.orchestrator.commit(None).await.unwrap().is_committed());

        config.commit_validation_level = ValidationLevel::Warning;
        let f = fixture_with(config, StaticDiagnostics::new(map));
        f.repo.set_changes(&["a.md"]);
        assert!(matches!(
            f.orchestrator.commit(None).await.unwrap(),
            CommitOutcome::ValidationFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_diagnostics_failure_counts_as_failure() {
        let mut config = base_config();
        config.commit_validation_level = ValidationLevel::Error;
        let f = fixture_with(config, StaticDiagnostics::failing());
        f.repo.set_changes(&["a.md"]);

        assert!(f.orchestrator.commit(None).await.is_err());
        assert!(!f.state.last_commit_successful());
        assert!(f.state.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_commits_run_once() {
        let f = fixture(base_config());
        f.repo.set_changes(&["a.md"]);
        f.repo.set_commit_delay(Duration::from_millis(100));

        let (first, second) = tokio::join!(f.orchestrator.commit(None), f.orchestrator.commit(None));

        assert!(first.unwrap().is_committed());
        assert_eq!(second.unwrap(), CommitOutcome::Busy);
        assert_eq!(f.repo.commits().len(), 1);
        assert!(!f.state.is_busy());
    }

    #[tokio::test]
    async fn test_two_failures_disable() {
        let f = fixture(base_config());
        f.repo.set_changes(&["a.md"]);
        f.repo.fail_commits(2);

        assert!(f.orchestrator.commit(None).await.is_err());
        assert!(f.state.is_enabled());
        assert!(f.interaction.warnings().is_empty());

        assert!(f.orchestrator.commit(None).await.is_err());
        assert!(!f.state.is_enabled());
        assert!(!f.settings.snapshot().unwrap().enabled);
        assert_eq!(f.interaction.warnings().len(), 1);
        assert!(!f.state.is_committing());

        // Disabled now, so nothing else is attempted
        assert_eq!(f.orchestrator.commit(None).await.unwrap(), CommitOutcome::Disabled);
    }

    #[tokio::test]
    async fn test_success_between_failures_keeps_enabled() {
        let f = fixture(base_config());

        f.repo.set_changes(&["a.md"]);
        f.repo.fail_commits(1);
        assert!(f.orchestrator.commit(None).await.is_err());

        assert!(f.orchestrator.commit(None).await.unwrap().is_committed());

        f.repo.set_changes(&["b.md"]);
        f.repo.fail_commits(1);
        assert!(f.orchestrator.commit(None).await.is_err());

        assert!(f.state.is_enabled());
        assert!(f.settings.snapshot().unwrap().enabled);
    }

    #[tokio::test]
    async fn test_explicit_message_skips_ai() {
        let mut config = base_config();
        config.ai.enabled = true;
        let provider = Arc::new(FakeModelProvider::with_reply(vec!["Update notes"]));
        let f = fixture(config);
        let orchestrator = CommitOrchestrator::new(
            f.repo.clone(),
            f.state.clone(),
            f.settings.clone(),
            Arc::new(StaticDiagnostics::default()),
            f.interaction.clone(),
        )
        .with_model_provider(provider.clone());
        f.repo.set_changes(&["a.md"]);

        orchestrator.commit(Some("Squashed notes")).await.unwrap();
        assert_eq!(f.repo.commits()[0].0, "Squashed notes");
        assert_eq!(provider.request_count(), 0);
    }

    async fn ai_commit(provider: FakeModelProvider) -> (Fixture, Result<CommitOutcome>) {
        let mut config = base_config();
        config.ai.enabled = true;
        config.commit_message_format = "yyyy-LL-dd".to_string();
        let mut f = fixture(config);
        f.orchestrator = CommitOrchestrator::new(
            f.repo.clone(),
            f.state.clone(),
            f.settings.clone(),
            Arc::new(StaticDiagnostics::default()),
            f.interaction.clone(),
        )
        .with_model_provider(Arc::new(provider));
        f.repo.set_changes(&["a.md"]);
        let result = f.orchestrator.commit(None).await;
        (f, result)
    }

    #[tokio::test]
    async fn test_ai_message_used() {
        let (f, result) = ai_commit(FakeModelProvider::with_reply(vec!["Add ", "notes\n"])).await;
        assert_eq!(
            result.unwrap(),
            CommitOutcome::Committed {
                message: "Add notes\n".to_string()
            }
        );
        assert_eq!(f.repo.commits()[0].0, "Add notes\n");
    }

    #[tokio::test]
    async fn test_empty_ai_message_falls_back_to_timestamp() {
        let (f, result) = ai_commit(FakeModelProvider::with_reply(Vec::<&str>::new())).await;
        assert!(result.unwrap().is_committed());
        assert!(is_iso_date(&f.repo.commits()[0].0));
    }

    #[tokio::test]
    async fn test_unavailable_model_fails_and_disables_ai() {
        let (f, result) = ai_commit(FakeModelProvider::unavailable()).await;

        assert!(matches!(result, Err(Error::ModelUnavailable(_))));
        assert!(f.repo.commits().is_empty());
        assert!(!f.settings.snapshot().unwrap().ai.enabled);
        assert!(!f.state.last_commit_successful());
        let warnings = f.interaction.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].0.contains("sonnet"));
    }

    #[tokio::test]
    async fn test_on_commit_push_and_pull() {
        let mut config = base_config();
        config.auto_push = AutoPush::OnCommit;
        config.auto_pull = AutoPull::OnCommit;
        config.push_mode = PushMode::Push;
        let f = fixture(config);
        f.repo.set_refs(vec![
            Ref::new("main", RefType::Head),
            Ref::new("origin/main", RefType::RemoteHead),
        ]);
        f.repo.set_changes(&["a.md"]);

        assert!(f.orchestrator.commit(None).await.unwrap().is_committed());
        assert_eq!(f.repo.pushes().len(), 1);
        assert_eq!(f.repo.pull_count(), 1);
        assert!(!f.state.is_pushing());
        assert!(!f.state.is_pulling());
    }

    #[tokio::test]
    async fn test_no_verify_forwarded() {
        let mut config = base_config();
        config.no_verify = true;
        let f = fixture(config);
        f.repo.set_changes(&["a.md"]);

        f.orchestrator.commit(None).await.unwrap();
        assert!(f.repo.commits()[0].1.no_verify);
    }
}
