//! User-facing prompts and warnings
//!
//! The core never talks to a terminal directly; the binary decides how a
//! force-push confirmation or a warning reaches the user.

use async_trait::async_trait;

/// Trait for the user interface the core reports to
#[async_trait]
pub trait Interaction: Send + Sync {
    /// Ask whether to overwrite a remote branch that has diverged
    async fn confirm_force_push(&self, remote: &str, branch: &str) -> bool;

    /// Show a warning that needs the user's attention
    async fn warn(&self, message: &str, detail: Option<&str>);
}

/// Interaction for unattended runs: never forces, only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct Headless;

#[async_trait]
impl Interaction for Headless {
    async fn confirm_force_push(&self, remote: &str, branch: &str) -> bool {
        tracing::warn!(
            remote,
            branch,
            "Remote contains conflicting changes; not forcing push without a user"
        );
        false
    }

    async fn warn(&self, message: &str, detail: Option<&str>) {
        match detail {
            Some(detail) => tracing::warn!(detail, "{}", message),
            None => tracing::warn!("{}", message),
        }
    }
}
