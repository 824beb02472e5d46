//! Claude Code CLI as a model provider
//!
//! Each request spawns `claude --print --output-format stream-json`, writes
//! the prompt to stdin and streams assistant text from the JSON lines.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use super::{ChatMessage, LanguageModel, ModelInfo, ModelProvider, TextStream};
use crate::{Error, Result};

const FAMILIES: [(&str, &str); 3] = [
    ("sonnet", "Claude Sonnet"),
    ("opus", "Claude Opus"),
    ("haiku", "Claude Haiku"),
];

/// A line of `stream-json` output; only assistant text matters here
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamLine {
    Assistant {
        #[serde(default)]
        message: AssistantMessage,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: serde_json::Value,
}

impl AssistantMessage {
    /// Content is either a plain string or a list of typed blocks
    fn text(&self) -> String {
        match &self.content {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Array(blocks) => blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect(),
            _ => String::new(),
        }
    }
}

/// Parse one output line into the assistant text it carries
fn parse_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamLine>(line) {
        Ok(StreamLine::Assistant { message }) => Some(message.text()).filter(|t| !t.is_empty()),
        Ok(StreamLine::Other) => None,
        Err(e) => {
            tracing::trace!(error = %e, line, "Skipping unparseable output line");
            None
        }
    }
}

/// Models reached through the `claude` executable
#[derive(Debug, Clone)]
pub struct ClaudeCliProvider {
    claude_path: String,
}

impl ClaudeCliProvider {
    pub fn new() -> Self {
        Self {
            claude_path: "claude".to_string(),
        }
    }

    /// Use a custom executable path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.claude_path = path.into();
        self
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.claude_path)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn models() -> Vec<ModelInfo> {
        FAMILIES
            .iter()
            .map(|(family, name)| ModelInfo {
                id: family.to_string(),
                name: name.to_string(),
                family: family.to_string(),
            })
            .collect()
    }
}

impl Default for ClaudeCliProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for ClaudeCliProvider {
    fn name(&self) -> &'static str {
        "claude"
    }

    async fn select_models(&self, family: &str) -> Result<Vec<Arc<dyn LanguageModel>>> {
        if !self.is_available().await {
            tracing::warn!(path = %self.claude_path, "Claude executable is not available");
            return Ok(Vec::new());
        }

        Ok(Self::models()
            .into_iter()
            .filter(|m| m.family == family || m.id == family)
            .map(|info| {
                Arc::new(ClaudeCliModel {
                    claude_path: self.claude_path.clone(),
                    info,
                }) as Arc<dyn LanguageModel>
            })
            .collect())
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        if !self.is_available().await {
            return Err(Error::Model(format!(
                "Claude executable not found at '{}'. Is Claude Code installed?",
                self.claude_path
            )));
        }
        Ok(Self::models())
    }
}

struct ClaudeCliModel {
    claude_path: String,
    info: ModelInfo,
}

struct ReplyState {
    lines: Lines<BufReader<ChildStdout>>,
    child: Child,
    produced: bool,
}

#[async_trait]
impl LanguageModel for ClaudeCliModel {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    async fn send_request(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut child = Command::new(&self.claude_path)
            .arg("--print")
            .arg("--verbose")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--model")
            .arg(&self.info.id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ModelUnavailable(self.info.family.clone())
                } else {
                    Error::Io(e)
                }
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Model("Failed to open claude stdin".to_string()))?;
        stdin.write_all(prompt.as_bytes()).await?;
        drop(stdin);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Model("Failed to capture claude stdout".to_string()))?;

        let state = ReplyState {
            lines: BufReader::new(stdout).lines(),
            child,
            produced: false,
        };

        let stream = stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            loop {
                match state.lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(text) = parse_line(&line) {
                            state.produced = true;
                            return Some((Ok(text), Some(state)));
                        }
                    }
                    Ok(None) => {
                        let status = state.child.wait().await;
                        return match status {
                            Ok(s) if !s.success() && !state.produced => Some((
                                Err(Error::Model(format!("claude exited with {}", s))),
                                None,
                            )),
                            Ok(_) => None,
                            Err(e) => Some((Err(Error::Io(e)), None)),
                        };
                    }
                    Err(e) => return Some((Err(Error::Io(e)), None)),
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
