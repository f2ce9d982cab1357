//! Tool result formatting for the conversation
//!
//! Results are fed back to the model as natural language. Successful results
//! get tool-specific text from a dispatch table keyed by tool name; failures
//! carry a recovery suggestion matched from known error patterns.

use serde_json::Value as JsonValue;

use crate::tools::ToolResult;

type SuccessFormatter = fn(&JsonValue) -> Option<String>;

/// Tool-specific success formatters
const SUCCESS_FORMATTERS: &[(&str, SuccessFormatter)] = &[
    ("filesystem", format_filesystem),
    ("execution", format_execution),
    ("search", format_search),
];

/// Known error patterns (lowercase) and what the model should try instead
const RECOVERY_PATTERNS: &[(&[&str], &str)] = &[
    (
        &["exited with status", "command not found"],
        "Read the command output, fix the command and try a different approach.",
    ),
    (
        &["no such file", "not found", "does not exist", "cannot find"],
        "Check the path with the filesystem tool (operation 'list' or 'exists'), or create the file with operation 'write'.",
    ),
    (
        &["is a directory"],
        "Use the filesystem tool with operation 'list' to inspect directories.",
    ),
    (
        &["permission denied", "outside the project root"],
        "Use a path inside the project root that you have permission to access.",
    ),
    (
        &["timeout", "timed out"],
        "The operation took too long. Try a smaller scope or a faster command.",
    ),
    (
        &["already attempted"],
        "Do not repeat the same call. Use the earlier result or change the parameters.",
    ),
    (
        &["invalid json", "invalid arguments", "expected value", "eof while parsing"],
        "Send the tool arguments as a valid JSON object.",
    ),
    (
        &["missing required parameter", "invalid type for parameter", "invalid value for parameter"],
        "Check the tool's parameter schema and provide every required parameter with the right type.",
    ),
    (
        &["invalid regex"],
        "Escape special characters in the search pattern.",
    ),
];

/// Recovery suggestion for an error message, if a known pattern matches
pub fn recovery_suggestion(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    RECOVERY_PATTERNS
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(_, suggestion)| *suggestion)
}

/// Cut `output` to at most `max_chars` characters
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    match output.char_indices().nth(max_chars) {
        None => output.to_string(),
        Some((byte_idx, _)) => format!(
            "{}... (truncated, {} total chars)",
            &output[..byte_idx],
            output.chars().count()
        ),
    }
}

/// Format a tool result as a message for the model
pub fn format_tool_result(tool: &str, result: &ToolResult, max_chars: usize) -> String {
    let mut text = match result {
        ToolResult::Success { data, .. } => SUCCESS_FORMATTERS
            .iter()
            .find(|(name, _)| *name == tool)
            .and_then(|(_, format)| format(data))
            .unwrap_or_else(|| format_generic(tool, data)),
        ToolResult::Failure {
            message,
            recovery_suggestion,
            ..
        } => {
            let mut text = format!("Tool '{}' failed: {}", tool, message);
            if let Some(suggestion) = recovery_suggestion {
                text.push_str(&format!("\nRecovery suggestion: {}", suggestion));
            }
            text
        }
        ToolResult::Skipped { reason } => {
            format!("Tool '{}' was not executed: {}", tool, reason)
        }
    };

    for warning in result.warnings() {
        text.push_str(&format!("\nWarning: {}", warning));
    }

    truncate_output(&text, max_chars)
}

fn format_generic(tool: &str, data: &JsonValue) -> String {
    let body = match data {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => "no output".to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    format!("Tool '{}' succeeded:\n{}", tool, body)
}

fn format_filesystem(data: &JsonValue) -> Option<String> {
    let path = data.get("path")?.as_str()?;
    match data.get("operation")?.as_str()? {
        "list" => {
            let entries = data.get("entries")?.as_array()?;
            if entries.is_empty() {
                return Some(format!("Directory '{}' is empty.", path));
            }
            let mut text = format!("Directory '{}' contains {} entries:", path, entries.len());
            for entry in entries.iter().filter_map(|e| e.as_str()) {
                text.push_str(&format!("\n- {}", entry));
            }
            Some(text)
        }
        "read" => {
            let content = data.get("content")?.as_str()?;
            let size = data.get("size").and_then(|s| s.as_u64()).unwrap_or(0);
            Some(format!(
                "Contents of '{}' ({} bytes):\n```\n{}\n```",
                path, size, content
            ))
        }
        "write" => {
            let bytes = data.get("bytes_written")?.as_u64()?;
            Some(format!("Wrote {} bytes to '{}'.", bytes, path))
        }
        "exists" => {
            let exists = data.get("exists")?.as_bool()?;
            let is_dir = data.get("is_dir").and_then(|d| d.as_bool()).unwrap_or(false);
            Some(match (exists, is_dir) {
                (true, true) => format!("'{}' exists and is a directory.", path),
                (true, false) => format!("'{}' exists and is a file.", path),
                (false, _) => format!("'{}' does not exist.", path),
            })
        }
        _ => None,
    }
}

fn format_execution(data: &JsonValue) -> Option<String> {
    let command = data.get("command")?.as_str()?;
    let code = data
        .get("exit_code")
        .and_then(|c| c.as_i64())
        .map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let stdout = data.get("stdout").and_then(|s| s.as_str()).unwrap_or("");
    let stderr = data.get("stderr").and_then(|s| s.as_str()).unwrap_or("");

    let mut text = format!("Command `{}` exited with code {}.", command, code);
    if stdout.trim().is_empty() && stderr.trim().is_empty() {
        text.push_str(" It produced no output.");
    }
    if !stdout.trim().is_empty() {
        text.push_str(&format!("\nstdout:\n{}", stdout.trim_end()));
    }
    if !stderr.trim().is_empty() {
        text.push_str(&format!("\nstderr:\n{}", stderr.trim_end()));
    }
    Some(text)
}

fn format_search(data: &JsonValue) -> Option<String> {
    let pattern = data.get("pattern")?.as_str()?;
    let matches = data.get("matches")?.as_array()?;
    if matches.is_empty() {
        return Some(format!("No matches for /{}/.", pattern));
    }

    let mut text = format!("Found {} matches for /{}/:", matches.len(), pattern);
    for m in matches {
        let file = m.get("file").and_then(|f| f.as_str()).unwrap_or("?");
        let line = m.get("line").and_then(|l| l.as_u64()).unwrap_or(0);
        let snippet = m.get("text").and_then(|t| t.as_str()).unwrap_or("");
        text.push_str(&format!("\n{}:{}: {}", file, line, snippet));
    }
    if data.get("truncated").and_then(|t| t.as_bool()) == Some(true) {
        text.push_str("\n(more matches omitted)");
    }
    Some(text)
}
