//! GitDoc Core - automatic commits for a git working tree
//!
//! This crate watches a repository, debounces bursts of file changes into a
//! single commit, optionally asks a language model for the commit message,
//! and keeps the branch in sync with its remote.

pub mod ai;
pub mod config;
pub mod debounce;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod git;
pub mod health;
pub mod interact;
pub mod orchestrator;
pub mod session;
pub mod sync;
pub mod timestamp;
pub mod versions;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{Config, ConfigOverrides, SettingsStore};
pub use error::{Error, Result};
pub use git::{GitRepo, Repository};
pub use interact::{Headless, Interaction};
pub use orchestrator::{CommitOrchestrator, CommitOutcome};
pub use session::ActivationState;
pub use watcher::{should_watch, WatchSession};
