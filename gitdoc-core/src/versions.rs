//! Restoring, squashing and undoing auto-committed versions
//!
//! Each operation rewrites the working tree or branch with git and then
//! goes through the regular commit cycle, so filters, validation and
//! auto-push apply the same way as for an automatic commit.

use std::path::Path;

use crate::orchestrator::{CommitOrchestrator, CommitOutcome};
use crate::Result;

/// Bring `path` back to its content at `reference` and commit it
pub async fn restore_version(
    orchestrator: &CommitOrchestrator,
    reference: &str,
    path: &Path,
) -> Result<CommitOutcome> {
    tracing::info!(reference, path = %path.display(), "Restoring version");
    orchestrator
        .repository()
        .checkout(reference, &[path.to_path_buf()])
        .await?;
    orchestrator.commit(None).await
}

/// Collapse every commit from `reference` up to HEAD into one
pub async fn squash_versions(
    orchestrator: &CommitOrchestrator,
    reference: &str,
    message: &str,
) -> Result<CommitOutcome> {
    tracing::info!(reference, "Squashing versions");
    orchestrator
        .repository()
        .reset(&format!("{}~1", reference))
        .await?;
    orchestrator.commit(Some(message)).await
}

/// Revert the changes introduced by `reference` as a new version
pub async fn undo_version(orchestrator: &CommitOrchestrator, reference: &str) -> Result<CommitOutcome> {
    tracing::info!(reference, "Undoing version");
    orchestrator.repository().revert_no_commit(reference).await?;
    orchestrator.commit(None).await
}
