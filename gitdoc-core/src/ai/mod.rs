//! Language-model commit messages
//!
//! A [`ModelProvider`] discovers models by family; a [`LanguageModel`]
//! answers a role-tagged conversation with an incremental text stream.
//! [`generate_commit_message`] turns the diffs of the changed files into a
//! single prompt and collects the streamed answer.

mod claude;
mod ollama;
mod prompts;

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};

use crate::config::{AiConfig, AiProviderKind};
use crate::git::Repository;
use crate::{Error, Result};

pub use claude::ClaudeCliProvider;
pub use ollama::OllamaProvider;
pub use prompts::{render_commit_prompt, PromptContext};

/// Body used for a file whose diff could not be produced
pub const DIFF_UNAVAILABLE: &str = "Error: Unable to generate diff for this file.";

/// Incremental model output
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Description of a selectable model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    /// Identifier persisted as `ai.model`
    pub id: String,
    /// Human readable label
    pub name: String,
    pub family: String,
}

/// A model that can answer a conversation
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn info(&self) -> &ModelInfo;

    /// Send the conversation and stream the reply
    async fn send_request(&self, messages: &[ChatMessage]) -> Result<TextStream>;
}

/// Trait for model backends
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Models whose family or id equals `family`; empty when none is reachable
    async fn select_models(&self, family: &str) -> Result<Vec<Arc<dyn LanguageModel>>>;

    /// Every model the provider offers
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
}

/// Build the provider named by the configuration
pub fn provider_from_config(ai: &AiConfig) -> Arc<dyn ModelProvider> {
    match ai.provider {
        AiProviderKind::Claude => Arc::new(ClaudeCliProvider::new().with_path(&ai.claude_path)),
        AiProviderKind::Ollama => Arc::new(OllamaProvider::new(&ai.endpoint)),
    }
}

/// Ask the configured model for a commit message describing `paths`
///
/// Returns the raw accumulated reply, which may be empty. Fails with
/// [`Error::ModelUnavailable`] when no model of the configured family is
/// available.
pub async fn generate_commit_message(
    repo: &dyn Repository,
    provider: &dyn ModelProvider,
    ai: &AiConfig,
    paths: &[PathBuf],
) -> Result<String> {
    tracing::debug!(files = paths.len(), "Generating commit message with AI");

    let sections =
        futures_util::future::join_all(paths.iter().map(|p| diff_section(repo, p))).await;

    tracing::debug!(provider = provider.name(), family = %ai.model, "Selecting model");
    let models = provider.select_models(&ai.model).await?;
    let Some(model) = models.first() else {
        return Err(Error::ModelUnavailable(ai.model.clone()));
    };

    let prompt = render_commit_prompt(
        &PromptContext::new()
            .with_diffs(sections.join("\n\n"))
            .with_emojis(ai.use_emojis)
            .with_custom_instructions(ai.custom_instructions.as_deref()),
    );

    tracing::debug!(model = %model.info().id, "Sending request");
    let mut stream = model.send_request(&[ChatMessage::user(prompt)]).await?;

    let mut summary = String::new();
    while let Some(chunk) = stream.next().await {
        summary.push_str(&chunk?);
    }

    Ok(summary)
}

async fn diff_section(repo: &dyn Repository, path: &Path) -> String {
    let relative = path.strip_prefix(repo.root()).unwrap_or(path);
    tracing::debug!(path = %relative.display(), "Changes found in file");

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return String::new();
    }

    let body = match repo.diff_with_head(path).await {
        Ok(diff) => diff,
        Err(e) => {
            tracing::warn!(path = %relative.display(), error = %e, "Failed to diff file");
            DIFF_UNAVAILABLE.to_string()
        }
    };

    format!("## {}\n---\n{}", relative.display(), body)
}
