//! Scripted model client for testing
//!
//! Replays canned turns instead of calling a model server. Each call to
//! `stream_chat` consumes the next turn; once the script runs out the client
//! answers with a plain text reply, which ends a conversation.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::stream;
use serde_json::Value as JsonValue;

use crate::llm::adapters::{AdapterError, ChatRequest, EventStream, ModelClient, StreamEvent};
use crate::llm::ToolCall;

/// One scripted model response
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Stream these items in order
    Events(Vec<Result<StreamEvent, AdapterError>>),
    /// Fail before the stream starts
    StartError(AdapterError),
}

impl ScriptedTurn {
    /// Plain text answer
    pub fn text(content: &str) -> Self {
        Self::Events(vec![
            Ok(StreamEvent::Content(content.to_string())),
            Ok(StreamEvent::Done),
        ])
    }

    /// Text streamed in several content chunks
    pub fn chunks(parts: &[&str]) -> Self {
        let mut events: Vec<_> = parts
            .iter()
            .map(|p| Ok(StreamEvent::Content(p.to_string())))
            .collect();
        events.push(Ok(StreamEvent::Done));
        Self::Events(events)
    }

    /// A single native tool call
    pub fn tool_call(name: &str, arguments: JsonValue) -> Self {
        Self::tool_calls(vec![ToolCall::new(name, arguments)])
    }

    /// Several native tool calls in one turn
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        let mut events: Vec<_> = calls
            .into_iter()
            .map(|c| Ok(StreamEvent::ToolCall(c)))
            .collect();
        events.push(Ok(StreamEvent::Done));
        Self::Events(events)
    }

    /// Content followed by a mid-stream error
    pub fn stream_error(partial: &str, error: AdapterError) -> Self {
        Self::Events(vec![Ok(StreamEvent::Content(partial.to_string())), Err(error)])
    }
}

/// Model client that replays scripted turns
#[derive(Debug, Default)]
pub struct ScriptedClient {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<ChatRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedClient {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    /// Number of `stream_chat` calls made
    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Turns not yet consumed
    pub fn remaining(&self) -> usize {
        lock(&self.turns).len()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<EventStream, AdapterError> {
        lock(&self.requests).push(request);
        let turn = lock(&self.turns)
            .pop_front()
            .unwrap_or_else(|| ScriptedTurn::text("Done."));

        match turn {
            ScriptedTurn::Events(events) => Ok(Box::pin(stream::iter(events))),
            ScriptedTurn::StartError(err) => Err(err),
        }
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_client_replays_turns_in_order() {
        let client = ScriptedClient::new(vec![
            ScriptedTurn::tool_call("filesystem", json!({"operation": "list"})),
            ScriptedTurn::text("All done"),
        ]);

        let first: Vec<_> = client
            .stream_chat(ChatRequest::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert!(matches!(&first[0], Ok(StreamEvent::ToolCall(c)) if c.name == "filesystem"));

        let second: Vec<_> = client
            .stream_chat(ChatRequest::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert!(matches!(&second[0], Ok(StreamEvent::Content(c)) if c == "All done"));
        assert_eq!(client.call_count(), 2);
        assert_eq!(client.remaining(), 0);
    }

    #[tokio::test]
    async fn test_scripted_client_exhausted_answers_text() {
        let client = ScriptedClient::default();
        let events: Vec<_> = client
            .stream_chat(ChatRequest::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Ok(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn test_scripted_client_start_error() {
        let client = ScriptedClient::new(vec![ScriptedTurn::StartError(AdapterError::Network(
            "refused".to_string(),
        ))]);
        assert!(client.stream_chat(ChatRequest::default()).await.is_err());
        assert_eq!(client.requests().len(), 1);
    }
}
