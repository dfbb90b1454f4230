//! OpenAI-compatible `chat/completions` streaming client
//!
//! Works against any endpoint speaking the OpenAI chat-completions protocol
//! (OpenRouter, vLLM, Ollama's `/v1`). With `"stream": true` the reply is an
//! SSE body of `data: {chunk}` events terminated by `data: [DONE]`. The SSE
//! framing is removed here so the assembler only ever sees the JSON chunks,
//! one per line.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

use super::{ChunkStream, Upstream};
use crate::config::UpstreamConfig;
use crate::error::{Result, StreamforgeError};
use crate::stream::ResponseFormat;

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Streaming client for OpenAI-compatible chat-completions endpoints
#[derive(Debug, Clone)]
pub struct OpenAiUpstream {
    client: Client,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiUpstream {
    /// Create a client from upstream configuration
    ///
    /// `base_url` is the API root, for example `https://openrouter.ai/api/v1`;
    /// `/chat/completions` is appended to it.
    ///
    /// # Errors
    ///
    /// Returns `StreamforgeError::Config` when no API key is configured and
    /// `StreamforgeError::Upstream` if the HTTP client cannot be built.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| StreamforgeError::Config("upstream.api_key is not configured".into()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("streamforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StreamforgeError::Upstream(format!("Failed to create HTTP client: {}", e)))?;

        let url = format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            CHAT_COMPLETIONS_PATH
        );

        tracing::info!("Initialized chat-completions upstream: url={}, model={}", url, config.model);

        Ok(Self {
            client,
            url,
            api_key,
            model: config.model.clone(),
        })
    }

    /// Fully resolved chat-completions endpoint
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Configured default model
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Stream a reply to `prompt` from `model` instead of the configured one
    ///
    /// # Errors
    ///
    /// Returns `StreamforgeError::Upstream` when the request cannot be sent
    /// or the endpoint answers with an error status.
    pub async fn stream_with_model(&self, prompt: &str, model: &str) -> Result<ChunkStream> {
        let preview: String = prompt.chars().take(50).collect();
        tracing::info!(model, "Sending prompt to chat-completions upstream: '{}...'", preview);

        let body = ChatCompletionRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
        };

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Failed to reach chat-completions upstream: {}", e);
                StreamforgeError::Upstream(format!("Failed to connect to chat-completions API: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Chat-completions upstream returned error {}: {}", status, error_text);
            return Err(StreamforgeError::Upstream(format!(
                "Chat completions API error {}: {}",
                status, error_text
            ))
            .into());
        }

        let chunks = response.bytes_stream().map_err(|e| {
            anyhow::Error::from(StreamforgeError::Upstream(format!(
                "Chat completions stream interrupted: {}",
                e
            )))
        });
        Ok(sse_payloads(Box::pin(chunks)))
    }
}

#[async_trait]
impl Upstream for OpenAiUpstream {
    async fn stream(&self, prompt: &str) -> Result<ChunkStream> {
        self.stream_with_model(prompt, &self.model).await
    }

    fn format(&self) -> ResponseFormat {
        ResponseFormat::ChatCompletion
    }
}

/// Incremental SSE parser that keeps only `data:` payloads
///
/// Events end at a blank line; several `data:` lines in one event are
/// joined with `\n`. Comment lines (`: keep-alive`), `event:`, `id:` and
/// `retry:` fields are dropped. After `data: [DONE]` every further byte is
/// ignored.
#[derive(Debug, Default)]
pub struct SseDataDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
    done: bool,
}

impl SseDataDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once `[DONE]` has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one raw chunk; returns the payloads of events it completed
    ///
    /// Each payload is followed by `\n` so consecutive payloads stay
    /// separated for the JSON extractor.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');

            if line.is_empty() {
                if let Some(payload) = self.dispatch() {
                    payloads.push(payload);
                }
                if self.done {
                    self.buffer.clear();
                    break;
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data_lines
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        payloads
    }

    /// Flush an event left open when the body ended without a blank line
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.done {
            return None;
        }
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let rest = String::from_utf8_lossy(&rest);
            if let Some(value) = rest.trim_end_matches('\r').strip_prefix("data:") {
                self.data_lines
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        self.dispatch()
    }

    fn dispatch(&mut self) -> Option<Bytes> {
        if self.data_lines.is_empty() {
            return None;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();

        if data.trim() == DONE_MARKER {
            tracing::debug!("Chat completions stream signalled [DONE]");
            self.done = true;
            return None;
        }
        let mut payload = data.into_bytes();
        payload.push(b'\n');
        Some(Bytes::from(payload))
    }
}

/// Wrap a raw SSE body into a stream of its `data:` payloads
///
/// The raw body is dropped as soon as `[DONE]` arrives.
pub fn sse_payloads(source: ChunkStream) -> ChunkStream {
    struct State {
        source: ChunkStream,
        decoder: SseDataDecoder,
        ready: VecDeque<Bytes>,
        ended: bool,
    }

    let state = State {
        source,
        decoder: SseDataDecoder::new(),
        ready: VecDeque::new(),
        ended: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(payload) = state.ready.pop_front() {
                return Some((Ok(payload), state));
            }
            if state.ended || state.decoder.is_done() {
                return None;
            }
            match state.source.next().await {
                Some(Ok(chunk)) => {
                    let payloads = state.decoder.feed(&chunk);
                    state.ready.extend(payloads);
                }
                Some(Err(e)) => {
                    state.ended = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.ended = true;
                    state.ready.extend(state.decoder.finish());
                }
            }
        }
    }))
}
