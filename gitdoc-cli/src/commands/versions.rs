//! Version commands - restore, squash and undo auto-committed versions

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use gitdoc_core::versions::{restore_version, squash_versions, undo_version};

use super::commit::report;
use super::{interaction, Workspace};

/// Restore a file to its content at a previous version
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Commit to restore from
    reference: String,

    /// File to restore
    path: PathBuf,
}

impl RestoreArgs {
    pub async fn execute(&self, workspace: &Workspace) -> anyhow::Result<()> {
        let path = if self.path.is_absolute() {
            self.path.clone()
        } else {
            std::env::current_dir()?.join(&self.path)
        };

        let config = workspace.settings.snapshot()?;
        let orchestrator = workspace.orchestrator(&config, interaction::for_stdin());
        let outcome = restore_version(&orchestrator, &self.reference, &path).await?;
        report(&outcome);
        Ok(())
    }
}

/// Squash every version from a commit up to HEAD into one
#[derive(Args, Debug)]
pub struct SquashArgs {
    /// Oldest commit to include
    reference: String,

    /// Message for the squashed commit (prompted for when omitted)
    #[arg(short, long)]
    message: Option<String>,
}

impl SquashArgs {
    pub async fn execute(&self, workspace: &Workspace) -> anyhow::Result<()> {
        let message = match &self.message {
            Some(message) => message.trim().to_string(),
            None => {
                let default = workspace
                    .repo
                    .commit_summary(&self.reference)
                    .with_context(|| format!("Unknown commit: {}", self.reference))?;
                interaction::prompt("Enter the name to give to the squashed version ", Some(&default))
                    .unwrap_or_default()
            }
        };

        if message.is_empty() {
            println!("No message given, squash aborted");
            return Ok(());
        }

        let config = workspace.settings.snapshot()?;
        let orchestrator = workspace.orchestrator(&config, interaction::for_stdin());
        let outcome = squash_versions(&orchestrator, &self.reference, &message).await?;
        report(&outcome);
        Ok(())
    }
}

/// Undo the changes a single version introduced
#[derive(Args, Debug)]
pub struct UndoArgs {
    /// Commit to undo
    reference: String,
}

impl UndoArgs {
    pub async fn execute(&self, workspace: &Workspace) -> anyhow::Result<()> {
        let config = workspace.settings.snapshot()?;
        let orchestrator = workspace.orchestrator(&config, interaction::for_stdin());
        let outcome = undo_version(&orchestrator, &self.reference).await?;
        report(&outcome);
        Ok(())
    }
}
