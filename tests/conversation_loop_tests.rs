//! Conversation Loop Tests
//!
//! Drives `ConversationLoop` with a scripted model client: quiescence, the
//! turn limit, the failure breaker, embedded JSON tool calls, and ordering of
//! tool results fed back to the model.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use ollama_code::config::ToolingConfig;
use ollama_code::execution_engine::{SafetyConfig, StaticPrompter, ToolExecutor};
use ollama_code::llm::adapters::fake::{ScriptedClient, ScriptedTurn};
use ollama_code::llm::{
    AdapterError, CallOrigin, ConversationError, ConversationLoop, Role, TerminationReason,
    ToolCall, ToolOptions,
};
use ollama_code::terminal::{BufferTerminal, TerminalLevel, TerminalOutput};
use ollama_code::tools::{
    ParameterType, Tool, ToolCategory, ToolExecutionContext, ToolMetadata, ToolParameter,
    ToolParams, ToolRegistry, ToolResult,
};

/// Waits `delay_ms`, then echoes `text`
struct DelayTool {
    metadata: ToolMetadata,
}

impl DelayTool {
    fn new() -> Self {
        Self {
            metadata: ToolMetadata {
                name: "delay".to_string(),
                description: "Echo text after a delay".to_string(),
                category: ToolCategory::Analysis,
                version: "1.0.0".to_string(),
                parameters: vec![
                    ToolParameter::required("text", ParameterType::String, "text to echo"),
                    ToolParameter::optional("delay_ms", ParameterType::Integer, "delay"),
                ],
                examples: vec![],
            },
        }
    }
}

#[async_trait]
impl Tool for DelayTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn execute(&self, params: ToolParams, _ctx: &ToolExecutionContext) -> ToolResult {
        let delay = params.get("delay_ms").and_then(|d| d.as_u64()).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        let text = params.get("text").and_then(|t| t.as_str()).unwrap_or_default();
        ToolResult::success(json!(text))
    }
}

struct Harness {
    client: Arc<ScriptedClient>,
    conversation: ConversationLoop,
    terminal: Arc<BufferTerminal>,
}

fn harness(
    turns: Vec<ScriptedTurn>,
    registry: ToolRegistry,
    tooling: ToolingConfig,
    safety: SafetyConfig,
) -> Harness {
    let client = Arc::new(ScriptedClient::new(turns));
    let terminal = Arc::new(BufferTerminal::new());
    let output = TerminalOutput::new(terminal.clone());
    let executor = ToolExecutor::new(Arc::new(registry), tooling, safety.clone())
        .with_prompter(Arc::new(StaticPrompter::approve_all()))
        .with_terminal(output.clone());
    let conversation =
        ConversationLoop::new(client.clone(), Arc::new(executor), safety).with_terminal(output);
    Harness {
        client,
        conversation,
        terminal,
    }
}

fn default_harness(turns: Vec<ScriptedTurn>) -> Harness {
    harness(
        turns,
        ToolRegistry::with_builtin_tools(),
        ToolingConfig::default(),
        SafetyConfig::default(),
    )
}

fn project() -> (TempDir, ToolExecutionContext) {
    let dir = TempDir::new().unwrap();
    let ctx = ToolExecutionContext::new(dir.path());
    (dir, ctx)
}

#[tokio::test]
async fn test_text_reply_ends_after_one_turn() {
    let h = default_harness(vec![ScriptedTurn::text("Hello! How can I help?")]);
    let (_dir, ctx) = project();

    let outcome = h
        .conversation
        .execute("hi", &ctx, &ToolOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.turns, 1);
    assert_eq!(outcome.tool_calls_executed, 0);
    assert!(outcome.conversation_complete);
    assert_eq!(outcome.termination, TerminationReason::Quiescent);
    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(outcome.messages[1].role, Role::Assistant);
    assert_eq!(outcome.final_response, "Hello! How can I help?");
    assert!(h.terminal.text().contains("Hello! How can I help?"));
}

#[tokio::test]
async fn test_list_files_then_answer() {
    let h = default_harness(vec![
        ScriptedTurn::tool_call("filesystem", json!({"operation": "list", "path": "src"})),
        ScriptedTurn::text("The src directory has three Rust files."),
    ]);
    let (dir, ctx) = project();
    std::fs::create_dir(dir.path().join("src")).unwrap();
    for name in ["lib.rs", "main.rs", "util.rs"] {
        std::fs::write(dir.path().join("src").join(name), "// file\n").unwrap();
    }

    let outcome = h
        .conversation
        .execute("list files in src", &ctx, &ToolOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.turns, 2);
    assert_eq!(outcome.tool_calls_executed, 1);
    assert!(outcome.conversation_complete);
    let roles: Vec<Role> = outcome.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(outcome.messages[1].tool_calls.len(), 1);
    let tool_message = &outcome.messages[2];
    assert_eq!(tool_message.tool_name.as_deref(), Some("filesystem"));
    assert!(tool_message
        .content
        .starts_with("Directory 'src' contains 3 entries:"));
    assert!(tool_message.content.contains("- main.rs"));

    // The second request carries the tool result back to the model
    let requests = h.client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 3);
}

#[tokio::test]
async fn test_stops_at_max_turns() {
    let safety = SafetyConfig {
        max_turns: 3,
        ..SafetyConfig::permissive()
    };
    let turns = ["a", "b", "c", "d", "e"]
        .iter()
        .map(|path| {
            ScriptedTurn::tool_call("filesystem", json!({"operation": "exists", "path": path}))
        })
        .collect();
    let h = harness(
        turns,
        ToolRegistry::with_builtin_tools(),
        ToolingConfig::default(),
        safety,
    );
    let (_dir, ctx) = project();

    let outcome = h
        .conversation
        .execute("keep going", &ctx, &ToolOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.turns, 3);
    assert_eq!(outcome.tool_calls_executed, 3);
    assert!(!outcome.conversation_complete);
    assert_eq!(outcome.termination, TerminationReason::MaxTurns);
    assert_eq!(h.client.call_count(), 3);
    assert!(h
        .terminal
        .contains(TerminalLevel::Warn, "Reached maximum conversation turns (3)"));
}

#[tokio::test]
async fn test_breaker_stops_after_consecutive_failures() {
    let h = default_harness(vec![
        ScriptedTurn::tool_call("filesystem", json!({"operation": "read", "path": "one.txt"})),
        ScriptedTurn::tool_call("filesystem", json!({"operation": "read", "path": "two.txt"})),
        ScriptedTurn::tool_call("filesystem", json!({"operation": "read", "path": "three.txt"})),
        ScriptedTurn::text("never reached"),
    ]);
    let (_dir, ctx) = project();

    let outcome = h
        .conversation
        .execute("read the notes", &ctx, &ToolOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.turns, 3);
    assert!(outcome.conversation_complete);
    assert_eq!(outcome.termination, TerminationReason::ConsecutiveFailures);
    assert_eq!(h.client.remaining(), 1);
    let failures = outcome
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool && m.content.contains("failed"))
        .count();
    assert_eq!(failures, 3);
}

#[tokio::test]
async fn test_success_resets_breaker() {
    let h = default_harness(vec![
        ScriptedTurn::tool_call("filesystem", json!({"operation": "read", "path": "one.txt"})),
        ScriptedTurn::tool_call("filesystem", json!({"operation": "read", "path": "two.txt"})),
        ScriptedTurn::tool_call("filesystem", json!({"operation": "list", "path": "."})),
        ScriptedTurn::tool_call("filesystem", json!({"operation": "read", "path": "three.txt"})),
        ScriptedTurn::text("done"),
    ]);
    let (_dir, ctx) = project();

    let outcome = h
        .conversation
        .execute("look around", &ctx, &ToolOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.turns, 5);
    assert_eq!(outcome.termination, TerminationReason::Quiescent);
}

#[tokio::test]
async fn test_json_split_across_chunks_executes_once() {
    let h = default_harness(vec![
        ScriptedTurn::chunks(&[
            "Let me check. {\"name\": \"filesystem\", ",
            "\"arguments\": {\"operation\": \"exists\", ",
            "\"path\": \"Cargo.toml\"}}",
        ]),
        ScriptedTurn::text("Cargo.toml exists."),
    ]);
    let (dir, ctx) = project();
    std::fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();

    let outcome = h
        .conversation
        .execute("is there a manifest?", &ctx, &ToolOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.turns, 2);
    assert_eq!(outcome.tool_calls_executed, 1);
    let assistant = &outcome.messages[1];
    assert_eq!(assistant.tool_calls.len(), 1);
    assert_eq!(assistant.tool_calls[0].origin, CallOrigin::Synthetic);
    assert_eq!(assistant.tool_calls[0].name, "filesystem");
    let tool_messages: Vec<_> = outcome
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    assert_eq!(tool_messages.len(), 1);
    assert!(tool_messages[0]
        .content
        .contains("'Cargo.toml' exists and is a file."));
}

#[tokio::test]
async fn test_embedded_json_ignored_when_tools_disabled() {
    let tooling = ToolingConfig {
        enable_tool_calling: false,
        ..ToolingConfig::default()
    };
    let h = harness(
        vec![ScriptedTurn::text(
            r#"{"name": "filesystem", "arguments": {"operation": "list"}}"#,
        )],
        ToolRegistry::with_builtin_tools(),
        tooling,
        SafetyConfig::default(),
    );
    let (_dir, ctx) = project();

    let outcome = h
        .conversation
        .execute("list", &ctx, &ToolOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.turns, 1);
    assert_eq!(outcome.tool_calls_executed, 0);
    assert!(h.client.requests()[0].tools.is_empty());
}

#[tokio::test]
async fn test_too_many_tool_calls_aborts() {
    let tooling = ToolingConfig {
        max_tools_per_request: 2,
        ..ToolingConfig::default()
    };
    let calls = ["a", "b", "c"]
        .iter()
        .map(|path| ToolCall::new("filesystem", json!({"operation": "exists", "path": path})))
        .collect();
    let h = harness(
        vec![ScriptedTurn::tool_calls(calls)],
        ToolRegistry::with_builtin_tools(),
        tooling,
        SafetyConfig::default(),
    );
    let (_dir, ctx) = project();

    let err = h
        .conversation
        .execute("check three paths", &ctx, &ToolOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err, ConversationError::ToolLimitExceeded { limit: 2 });
}

#[tokio::test]
async fn test_stream_error_keeps_partial_content() {
    let h = default_harness(vec![ScriptedTurn::stream_error(
        "The answer is",
        AdapterError::Streaming("connection reset".to_string()),
    )]);
    let (_dir, ctx) = project();

    let outcome = h
        .conversation
        .execute("question", &ctx, &ToolOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.turns, 1);
    assert!(outcome.conversation_complete);
    assert_eq!(outcome.final_response, "The answer is");
    assert_eq!(outcome.stream_errors.len(), 1);
    assert!(outcome.stream_errors[0].contains("connection reset"));
    assert_eq!(
        outcome.messages.last().map(|m| m.content.as_str()),
        Some("The answer is")
    );
    assert!(h.terminal.contains(TerminalLevel::Error, "connection reset"));
}

#[tokio::test]
async fn test_tool_messages_follow_call_order() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(DelayTool::new()));
    let h = harness(
        vec![
            ScriptedTurn::tool_calls(vec![
                ToolCall::new("delay", json!({"text": "slow", "delay_ms": 200})),
                ToolCall::new("delay", json!({"text": "fast", "delay_ms": 0})),
            ]),
            ScriptedTurn::text("both done"),
        ],
        registry,
        ToolingConfig::default(),
        SafetyConfig::default(),
    );
    let (_dir, ctx) = project();

    let outcome = h
        .conversation
        .execute("run both", &ctx, &ToolOptions::default())
        .await
        .unwrap();

    let tool_messages: Vec<&str> = outcome
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(tool_messages.len(), 2);
    assert!(tool_messages[0].contains("slow"));
    assert!(tool_messages[1].contains("fast"));
}

#[tokio::test]
async fn test_history_is_extended() {
    let h = default_harness(vec![ScriptedTurn::text("Second answer")]);
    let (_dir, ctx) = project();
    let history = vec![
        ollama_code::llm::Message::user("first question"),
        ollama_code::llm::Message::assistant("first answer"),
        ollama_code::llm::Message::user("second question"),
    ];

    let outcome = h
        .conversation
        .execute_with_history(history, &ctx, &ToolOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.messages.len(), 4);
    assert_eq!(h.client.requests()[0].messages.len(), 3);
}
