//! Commit command - run one commit cycle now

use clap::Args;
use gitdoc_core::CommitOutcome;

use super::{interaction, Workspace};

/// Commit pending changes now
#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Use this message instead of a timestamp or AI summary
    #[arg(short, long)]
    message: Option<String>,
}

impl CommitArgs {
    /// Execute the commit command
    pub async fn execute(&self, workspace: &Workspace) -> anyhow::Result<()> {
        let config = workspace.settings.snapshot()?;
        let orchestrator = workspace.orchestrator(&config, interaction::for_stdin());

        let outcome = orchestrator.commit(self.message.as_deref()).await?;
        report(&outcome);
        Ok(())
    }
}

/// Print a one-line summary of a commit cycle
pub fn report(outcome: &CommitOutcome) {
    match outcome {
        CommitOutcome::Committed { message } => println!("Committed: {}", message),
        CommitOutcome::Disabled => println!("GitDoc is disabled for this repository"),
        CommitOutcome::Busy => println!("Another commit is in progress"),
        CommitOutcome::NoChanges => println!("Nothing to commit"),
        CommitOutcome::NothingMatched => println!("No changed files match the file pattern"),
        CommitOutcome::ValidationFailed { paths } => {
            println!("Not committing, problems found in:");
            for path in paths {
                println!("  {}", path.display());
            }
        }
    }
}
