//! Model adapters
//!
//! Provider-agnostic interface for streaming chat completions with tool calling.
//! A request yields a stream of [`StreamEvent`]s: content chunks, native tool
//! calls, and a final `Done`. Errors are delivered as stream items so a turn can
//! keep whatever content arrived before the failure.

pub mod fake;
pub mod ollama;
pub mod ollama_parse;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value as JsonValue;

use crate::llm::{Message, ToolCall};

pub use fake::ScriptedClient;
pub use ollama::OllamaClient;

/// Adapter errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    /// Network error (connection refused, timeout, etc.)
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP error (non-2xx status)
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// Invalid response from provider
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Error reported by the model server inside the stream
    #[error("Provider error: {0}")]
    Provider(String),

    /// Streaming protocol error
    #[error("Streaming error: {0}")]
    Streaming(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::Json(err.to_string())
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => AdapterError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => AdapterError::Network(err.to_string()),
        }
    }
}

/// One event of a streamed chat completion
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Piece of assistant text
    Content(String),
    /// Tool call from the structured tool-calling channel
    ToolCall(ToolCall),
    /// Model finished its response
    Done,
}

/// Boxed stream of events returned by [`ModelClient::stream_chat`]
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, AdapterError>> + Send>>;

/// Streaming chat request
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Model override (adapter default when None)
    pub model: Option<String>,
    /// System prompt prepended to the messages
    pub system: Option<String>,
    /// Conversation history
    pub messages: Vec<Message>,
    /// Tool schemas in function-calling format (empty disables tools)
    pub tools: Vec<JsonValue>,
}

/// Streaming model client
///
/// Implemented by every provider. The conversation loop only talks to models
/// through this trait.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Start a streaming chat completion
    ///
    /// Errors returned here mean the request could not be started at all;
    /// errors after the first byte arrive as stream items.
    async fn stream_chat(&self, request: ChatRequest) -> Result<EventStream, AdapterError>;

    /// Provider name for logging
    fn provider_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_error_display() {
        let err = AdapterError::Network("test".to_string());
        assert_eq!(format!("{}", err), "Network error: test");

        let err = AdapterError::Http {
            status: 404,
            message: "not found".to_string(),
        };
        assert_eq!(format!("{}", err), "HTTP error 404: not found");
    }

    #[test]
    fn test_json_error_conversion() {
        let err: AdapterError = serde_json::from_str::<JsonValue>("{").unwrap_err().into();
        assert!(matches!(err, AdapterError::Json(_)));
    }
}
