//! Error types for GitDoc

use thiserror::Error;

/// Result type alias for GitDoc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for GitDoc operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// libgit2 error
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// A `git` subprocess exited unsuccessfully
    #[error("`git {command}` failed: {stderr}")]
    GitCommand { command: String, stderr: String },

    /// The remote refused the push because it has diverged
    #[error("Push rejected by remote: {0}")]
    PushRejected(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid file pattern
    #[error("Invalid pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    /// No language model matches the configured family
    #[error("AI model not found: {0}")]
    ModelUnavailable(String),

    /// Language model request or stream failure
    #[error("Model error: {0}")]
    Model(String),

    /// Diagnostics lookup failure
    #[error("Diagnostics error: {0}")]
    Diagnostics(String),

    /// File watcher error
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
