//! CLI command implementations

pub mod commit;
pub mod interaction;
pub mod models;
pub mod versions;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use gitdoc_core::config::Config;
use gitdoc_core::diagnostics::ConfiguredDiagnostics;
use gitdoc_core::{
    ActivationState, CommitOrchestrator, ConfigOverrides, GitRepo, Interaction, SettingsStore,
};

pub use commit::CommitArgs;
pub use models::ModelsArgs;
pub use versions::{RestoreArgs, SquashArgs, UndoArgs};
pub use watch::WatchArgs;

/// The repository a command runs against, with its settings
pub struct Workspace {
    pub repo: Arc<GitRepo>,
    pub settings: Arc<SettingsStore>,
}

impl Workspace {
    /// Open the repository containing `path`
    pub fn open(path: &Path, overrides: ConfigOverrides) -> anyhow::Result<Self> {
        let repo = GitRepo::open(path)
            .with_context(|| format!("Failed to open repository at {}", path.display()))?;
        let settings = SettingsStore::for_repository(repo.git_dir(), overrides);
        Ok(Self {
            repo: Arc::new(repo),
            settings: Arc::new(settings),
        })
    }

    /// Build an orchestrator with a fresh activation state
    pub fn orchestrator(
        &self,
        config: &Config,
        interaction: Arc<dyn Interaction>,
    ) -> CommitOrchestrator {
        use gitdoc_core::Repository;

        let diagnostics = ConfiguredDiagnostics::new(self.settings.clone(), self.repo.root());
        CommitOrchestrator::new(
            self.repo.clone(),
            Arc::new(ActivationState::new(config.enabled)),
            self.settings.clone(),
            Arc::new(diagnostics),
            interaction,
        )
    }
}

/// Print the effective configuration and where it comes from
pub fn print_config(workspace: &Workspace) -> anyhow::Result<()> {
    let config = workspace.settings.snapshot()?;

    println!("# Effective configuration");
    match workspace.settings.global_path() {
        Some(path) => println!("# global:    {}", path.display()),
        None => println!("# global:    (none)"),
    }
    if let Some(path) = workspace.settings.workspace_path() {
        println!("# workspace: {}", path.display());
    }
    println!();
    print!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}
