//! Tool calls embedded in streamed text
//!
//! Some models ignore the native tool-calling channel and write the call as
//! raw JSON in their content, e.g. `{"name":"execution","arguments":{...}}`.
//! The parser accumulates content for one turn and extracts every such object
//! exactly once, no matter how the text is split into chunks.
//!
//! Object boundaries are found with a string-aware brace scan. This is a
//! heuristic, not a JSON tokenizer; the JSON itself is validated by serde.

use std::collections::HashSet;

use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use crate::llm::ToolCall;

/// Default bound on failed parse attempts per turn
pub const DEFAULT_MAX_PARSE_ATTEMPTS: usize = 10;

/// Outcome of one lenient parse attempt at a `{`
enum ParseAttempt {
    /// A full JSON object (trailing text ignored)
    Complete(JsonValue),
    /// Valid prefix, more input needed
    Incomplete,
    /// Not JSON
    Invalid,
}

/// Incremental detector for JSON tool calls in content chunks
#[derive(Debug)]
pub struct StreamingContentParser {
    buffer: String,
    /// Bytes of `buffer` already consumed by the scanner
    processed_offset: usize,
    /// `name + serialized(arguments)` of calls extracted this turn
    processed_keys: HashSet<String>,
    failed_attempts: usize,
    max_attempts: usize,
    exhausted: bool,
}

impl Default for StreamingContentParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PARSE_ATTEMPTS)
    }
}

impl StreamingContentParser {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            buffer: String::new(),
            processed_offset: 0,
            processed_keys: HashSet::new(),
            failed_attempts: 0,
            max_attempts,
            exhausted: false,
        }
    }

    /// Append a content chunk and return newly detected tool calls
    pub fn push(&mut self, chunk: &str) -> Vec<ToolCall> {
        self.buffer.push_str(chunk);
        if self.exhausted || !self.has_trigger() {
            return Vec::new();
        }
        self.scan()
    }

    /// Forget everything; called at the start of each turn
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.processed_offset = 0;
        self.processed_keys.clear();
        self.failed_attempts = 0;
        self.exhausted = false;
    }

    pub fn failed_attempts(&self) -> usize {
        self.failed_attempts
    }

    /// True once the failed-attempt bound was hit for this turn
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn has_trigger(&self) -> bool {
        let pending = &self.buffer[self.processed_offset..];
        pending.contains("\"name\"") && pending.contains("\"arguments\"")
    }

    fn scan(&mut self) -> Vec<ToolCall> {
        let mut calls = Vec::new();

        while let Some(rel) = self.buffer[self.processed_offset..].find('{') {
            let start = self.processed_offset + rel;

            match parse_object_at(&self.buffer[start..]) {
                ParseAttempt::Incomplete => break,
                ParseAttempt::Invalid => {
                    self.failed_attempts += 1;
                    self.processed_offset = start + 1;
                    trace!(
                        offset = start,
                        attempts = self.failed_attempts,
                        "Streamed content is not a JSON object"
                    );
                    if self.failed_attempts >= self.max_attempts {
                        debug!(
                            max_attempts = self.max_attempts,
                            "Giving up on embedded tool call detection for this turn"
                        );
                        self.exhausted = true;
                        break;
                    }
                }
                ParseAttempt::Complete(value) => {
                    self.processed_offset = match find_object_end(&self.buffer, start) {
                        Some(end) => end,
                        None => start + 1,
                    };
                    if let Some(call) = self.extract_call(&value) {
                        calls.push(call);
                    }
                }
            }
        }

        calls
    }

    fn extract_call(&mut self, value: &JsonValue) -> Option<ToolCall> {
        let name = value.get("name")?.as_str().filter(|n| !n.is_empty())?;
        let arguments = value.get("arguments")?;

        let key = format!("{}{}", name, arguments);
        if !self.processed_keys.insert(key) {
            trace!(tool = name, "Embedded tool call already extracted");
            return None;
        }

        debug!(tool = name, "Detected tool call in streamed content");
        Some(ToolCall::synthetic(name, arguments.clone()))
    }
}

/// Parse the first JSON value of `text`, tolerating trailing content
fn parse_object_at(text: &str) -> ParseAttempt {
    let mut values = serde_json::Deserializer::from_str(text).into_iter::<JsonValue>();
    match values.next() {
        Some(Ok(value)) if value.is_object() => ParseAttempt::Complete(value),
        Some(Ok(_)) => ParseAttempt::Invalid,
        Some(Err(err)) if err.is_eof() => ParseAttempt::Incomplete,
        Some(Err(_)) => ParseAttempt::Invalid,
        None => ParseAttempt::Incomplete,
    }
}

/// Byte offset just past the `}` closing the object opened at `start`
///
/// Braces inside string literals (including escaped quotes) are skipped.
pub fn find_object_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Heuristic for chunks that are raw tool-call JSON rather than prose
pub fn looks_like_tool_json(chunk: &str) -> bool {
    let trimmed = chunk.trim_start();
    let body = trimmed.strip_prefix('{').unwrap_or(trimmed).trim_start();
    body.starts_with("\"name\"") || body.starts_with("\"arguments\"")
}
