//! Ollama request building and response parsing
//!
//! Pure functions over JSON strings so they can be tested on fixtures.

use serde_json::{json, Value as JsonValue};
use tracing::warn;

use crate::llm::adapters::{AdapterError, ChatRequest, StreamEvent};
use crate::llm::{Message, Role, ToolCall};

/// Build the `/api/chat` request body
pub fn build_chat_body(model: &str, request: &ChatRequest, stream: bool) -> JsonValue {
    let mut messages: Vec<JsonValue> = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = request.system.as_deref().filter(|s| !s.trim().is_empty()) {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.extend(request.messages.iter().map(message_to_json));

    let mut body = json!({
        "model": request.model.as_deref().unwrap_or(model),
        "messages": messages,
        "stream": stream,
    });
    if !request.tools.is_empty() {
        body["tools"] = JsonValue::Array(request.tools.clone());
    }
    body
}

fn message_to_json(msg: &Message) -> JsonValue {
    let mut value = json!({
        "role": msg.role.as_str(),
        "content": msg.content,
    });
    if msg.role == Role::Assistant && !msg.tool_calls.is_empty() {
        let calls: Vec<JsonValue> = msg
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "function": {
                        "name": call.name,
                        "arguments": arguments_as_object(&call.arguments),
                    }
                })
            })
            .collect();
        value["tool_calls"] = JsonValue::Array(calls);
    }
    if let Some(tool_name) = &msg.tool_name {
        value["tool_name"] = JsonValue::String(tool_name.clone());
    }
    value
}

/// Ollama expects arguments as an object; decode JSON strings when possible
fn arguments_as_object(arguments: &JsonValue) -> JsonValue {
    match arguments {
        JsonValue::String(raw) => serde_json::from_str::<JsonValue>(raw)
            .ok()
            .filter(JsonValue::is_object)
            .unwrap_or_else(|| json!({})),
        JsonValue::Null => json!({}),
        other => other.clone(),
    }
}

/// Parse one NDJSON line of a streaming `/api/chat` response
///
/// A line can carry content, tool calls and the done marker at once; events
/// are returned in that order. Blank lines yield no events. A tool call
/// without a function name is dropped with a warning; the rest of the line
/// still counts.
pub fn parse_stream_line(line: &str) -> Result<Vec<StreamEvent>, AdapterError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }

    let json: JsonValue = serde_json::from_str(line)?;

    if let Some(error) = json.get("error").and_then(|e| e.as_str()) {
        return Err(AdapterError::Provider(error.to_string()));
    }

    let mut events = Vec::new();
    let message = json.get("message");

    if let Some(content) = message
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
    {
        if !content.is_empty() {
            events.push(StreamEvent::Content(content.to_string()));
        }
    }

    if let Some(calls) = message
        .and_then(|m| m.get("tool_calls"))
        .and_then(|c| c.as_array())
    {
        for raw in calls {
            match parse_tool_call(raw) {
                Some(call) => events.push(StreamEvent::ToolCall(call)),
                None => warn!(call = %raw, "Skipping tool call without function.name"),
            }
        }
    }

    if json.get("done").and_then(|d| d.as_bool()) == Some(true) {
        events.push(StreamEvent::Done);
    }

    Ok(events)
}

fn parse_tool_call(raw: &JsonValue) -> Option<ToolCall> {
    let function = raw.get("function").unwrap_or(raw);
    let name = function
        .get("name")
        .and_then(|n| n.as_str())
        .filter(|n| !n.is_empty())?;
    let arguments = function.get("arguments").cloned().unwrap_or(JsonValue::Null);

    let mut call = ToolCall::new(name, arguments);
    // Ollama does not assign ids; keep one if a compatible server sends it
    if let Some(id) = raw.get("id").and_then(|i| i.as_str()).filter(|i| !i.is_empty()) {
        call.id = id.to_string();
    }
    Some(call)
}

/// Parse the `/api/tags` model listing
pub fn parse_model_tags(response: &str) -> Result<Vec<String>, AdapterError> {
    let json: JsonValue = serde_json::from_str(response)?;
    let models = json
        .get("models")
        .and_then(|m| m.as_array())
        .ok_or_else(|| AdapterError::InvalidResponse("Missing models array".to_string()))?;

    Ok(models
        .iter()
        .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
        .map(str::to_string)
        .collect())
}

/// Incremental NDJSON line splitter
///
/// Network chunks do not respect line (or UTF-8) boundaries, so bytes are
/// buffered until a newline arrives.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every complete line
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    /// Flush a trailing line that had no newline
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}
