//! Ollama adapter
//!
//! Talks to a local Ollama server over HTTP. Chat completions are streamed as
//! NDJSON and decoded incrementally into [`StreamEvent`]s.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, warn};

use crate::config::OllamaConfig;
use crate::llm::adapters::ollama_parse::{
    build_chat_body, parse_model_tags, parse_stream_line, NdjsonDecoder,
};
use crate::llm::adapters::{AdapterError, ChatRequest, EventStream, ModelClient, StreamEvent};

/// Ollama adapter (local HTTP API)
#[derive(Debug, Clone)]
pub struct OllamaClient {
    /// Base URL (e.g., http://127.0.0.1:11434)
    base_url: String,
    /// Default model name (e.g., llama3.1:8b)
    model: String,
    http: reqwest::Client,
}

impl OllamaClient {
    /// Create a client with default HTTP settings
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.into()),
            model: model.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Create a client from the `[ollama]` configuration section
    pub fn from_config(config: &OllamaConfig) -> Result<Self, AdapterError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self {
            base_url: normalize_base_url(config.host.clone()),
            model: config.model.clone(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// List locally available models (`/api/tags`)
    pub async fn list_models(&self) -> Result<Vec<String>, AdapterError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AdapterError::Http {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }
        parse_model_tags(&body)
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<EventStream, AdapterError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = build_chat_body(&self.model, &request, true);
        debug!(
            url = %url,
            model = %body["model"],
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Starting Ollama chat stream"
        );

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AdapterError::Http {
                status: status.as_u16(),
                message: extract_error_message(&text),
            });
        }

        Ok(decode_stream(response.bytes_stream()))
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}

fn normalize_base_url(url: String) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Ollama reports failures as `{"error": "..."}`
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

struct DecodeState<S> {
    inner: Pin<Box<S>>,
    decoder: NdjsonDecoder,
    pending: VecDeque<Result<StreamEvent, AdapterError>>,
    inner_done: bool,
    finished: bool,
}

impl<S> DecodeState<S> {
    fn enqueue_line(&mut self, line: &str) {
        match parse_stream_line(line) {
            Ok(events) => self.pending.extend(events.into_iter().map(Ok)),
            Err(err) => {
                warn!(error = %err, "Failed to decode Ollama stream line");
                self.pending.push_back(Err(err));
            }
        }
    }
}

/// Decode a byte stream of NDJSON lines into chat events
///
/// The stream ends after `Done` or the first error.
pub fn decode_stream<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<AdapterError> + Send + 'static,
{
    let state = DecodeState {
        inner: Box::pin(bytes),
        decoder: NdjsonDecoder::new(),
        pending: VecDeque::new(),
        inner_done: false,
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }
            if let Some(item) = state.pending.pop_front() {
                if matches!(item, Ok(StreamEvent::Done) | Err(_)) {
                    state.finished = true;
                }
                return Some((item, state));
            }
            if state.inner_done {
                return None;
            }
            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    for line in state.decoder.push(chunk.as_ref()) {
                        state.enqueue_line(&line);
                    }
                }
                Some(Err(err)) => state.pending.push_back(Err(err.into())),
                None => {
                    state.inner_done = true;
                    if let Some(line) = state.decoder.finish() {
                        state.enqueue_line(&line);
                    }
                }
            }
        }
    }))
}
