//! Ollama model provider
//!
//! Talks to a locally running Ollama, `http://localhost:11434` by default.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::{ChatMessage, LanguageModel, ModelInfo, ModelProvider, TextStream};
use crate::{Error, Result};

/// Ollama API response for listing models
#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
    #[serde(default)]
    details: Option<TagDetails>,
}

#[derive(Deserialize)]
struct TagDetails {
    #[serde(default)]
    family: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// One line of a streamed `/api/chat` response
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// Ollama provider implementation
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    endpoint: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_tags(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.endpoint);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| Error::Model(format!("Failed to connect to Ollama: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Model(format!(
                "Ollama returned error: {}",
                response.status()
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| Error::Model(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| {
                let family = m
                    .details
                    .and_then(|d| d.family)
                    .unwrap_or_else(|| base_name(&m.name).to_string());
                ModelInfo {
                    id: m.name.clone(),
                    name: m.name,
                    family,
                }
            })
            .collect())
    }
}

/// `llama3:8b` -> `llama3`
fn base_name(name: &str) -> &str {
    name.split(':').next().unwrap_or(name)
}

fn matches_family(model: &ModelInfo, family: &str) -> bool {
    model.id == family || model.family == family || base_name(&model.id) == family
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn select_models(&self, family: &str) -> Result<Vec<Arc<dyn LanguageModel>>> {
        let models = match self.fetch_tags().await {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!(error = %e, endpoint = %self.endpoint, "Ollama is not reachable");
                return Ok(Vec::new());
            }
        };

        Ok(models
            .into_iter()
            .filter(|m| matches_family(m, family))
            .map(|info| {
                Arc::new(OllamaModel {
                    endpoint: self.endpoint.clone(),
                    client: self.client.clone(),
                    info,
                }) as Arc<dyn LanguageModel>
            })
            .collect())
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.fetch_tags().await
    }
}

struct OllamaModel {
    endpoint: String,
    client: reqwest::Client,
    info: ModelInfo,
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    async fn send_request(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let request = ChatRequest {
            model: &self.info.id,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .json(&request)
            .timeout(Duration::from_secs(120))
            .send()
            .await
            .map_err(|e| Error::Model(format!("Failed to connect to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!("Ollama error ({}): {}", status, body)));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::Model(format!("Ollama stream failed: {}", e))));
        Ok(Box::pin(ndjson_text(bytes)))
    }
}

/// Turn a byte stream of newline-delimited chat chunks into text pieces
fn ndjson_text<S, B>(bytes: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    struct State<S> {
        bytes: Pin<Box<S>>,
        buffer: Vec<u8>,
        finished: bool,
    }

    let state = State {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                match parse_chunk(&line) {
                    Some(Ok(text)) if text.is_empty() => continue,
                    Some(item) => return Some((item, state)),
                    None => continue,
                }
            }

            if state.finished {
                let rest = std::mem::take(&mut state.buffer);
                return match parse_chunk(&rest) {
                    Some(Ok(text)) if text.is_empty() => None,
                    Some(item) => Some((item, state)),
                    None => None,
                };
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    state.finished = true;
                    state.buffer.clear();
                    return Some((Err(e), state));
                }
                None => state.finished = true,
            }
        }
    })
}

fn parse_chunk(line: &[u8]) -> Option<Result<String>> {
    let line = std::str::from_utf8(line).ok()?.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<ChatChunk>(line) {
        Ok(ChatChunk {
            error: Some(error), ..
        }) => Some(Err(Error::Model(error))),
        Ok(chunk) => {
            if chunk.done {
                tracing::trace!("Ollama reply complete");
            }
            Some(Ok(chunk.message.map(|m| m.content).unwrap_or_default()))
        }
        Err(e) => Some(Err(Error::Json(e))),
    }
}
