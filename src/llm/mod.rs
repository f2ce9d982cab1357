//! LLM integration: conversation types, model adapters and the tool loop
//!
//! - `adapters`: streaming model clients (Ollama, scripted fake)
//! - `streaming_parser`: detection of tool calls embedded in streamed text
//! - `chat_loop`: the multi-turn tool-calling conversation driver

pub mod adapters;
pub mod chat_loop;
pub mod streaming_parser;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// Re-export main types
pub use adapters::{AdapterError, ChatRequest, ModelClient, StreamEvent};
pub use chat_loop::{
    ConversationError, ConversationLoop, ConversationOutcome, TerminationReason, ToolOptions,
};
pub use streaming_parser::StreamingContentParser;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message (sets behavior/context)
    System,
    /// User message (human input)
    User,
    /// Assistant message (model response)
    Assistant,
    /// Tool result fed back to the model
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// Where a tool call came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallOrigin {
    /// Structured tool-call channel of the model API
    #[default]
    Native,
    /// JSON object detected inside streamed text content
    Synthetic,
}

/// A tool invocation requested by the model
///
/// `arguments` is either a JSON object or a JSON-encoded string
/// (`JsonValue::String`); the executor accepts both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: JsonValue,
    #[serde(default)]
    pub origin: CallOrigin,
}

impl ToolCall {
    /// Create a native tool call with a generated id
    pub fn new(name: impl Into<String>, arguments: JsonValue) -> Self {
        Self {
            id: generate_call_id("call"),
            name: name.into(),
            arguments,
            origin: CallOrigin::Native,
        }
    }

    /// Create a call detected in streamed content
    pub fn synthetic(name: impl Into<String>, arguments: JsonValue) -> Self {
        Self {
            id: generate_call_id("synthetic"),
            name: name.into(),
            arguments,
            origin: CallOrigin::Synthetic,
        }
    }

    /// Override the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Assign a generated id when the model did not provide one
    pub fn ensure_id(&mut self) {
        if self.id.trim().is_empty() {
            self.id = generate_call_id("call");
        }
    }
}

/// Generate a unique tool call id
pub fn generate_call_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

/// One message in the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Tool that produced this message (tool role only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Assistant message carrying the tool calls of its turn
    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// Tool result message
    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_ids_are_unique() {
        let a = ToolCall::new("filesystem", json!({}));
        let b = ToolCall::new("filesystem", json!({}));
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("call_"));
    }

    #[test]
    fn test_synthetic_call_origin() {
        let call = ToolCall::synthetic("execution", json!({"command": "ls"}));
        assert_eq!(call.origin, CallOrigin::Synthetic);
        assert!(call.id.starts_with("synthetic_"));
    }

    #[test]
    fn test_ensure_id_only_fills_blank() {
        let mut call = ToolCall::new("search", json!({})).with_id("");
        call.ensure_id();
        assert!(!call.id.is_empty());

        let mut named = ToolCall::new("search", json!({})).with_id("abc");
        named.ensure_id();
        assert_eq!(named.id, "abc");
    }

    #[test]
    fn test_tool_message_has_name() {
        let msg = Message::tool("filesystem", "ok");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_name.as_deref(), Some("filesystem"));
    }
}
