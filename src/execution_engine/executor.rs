//! Tool executor
//!
//! Runs one tool call through a fixed sequence of gates:
//!
//! 1. Resolve the tool (missing → [`ExecutionError::ToolNotFound`])
//! 2. Parse arguments (object or JSON string)
//! 3. Refuse duplicates inside the dedup window
//! 4. Approval for gated categories (cached, skipped, or prompted with a timeout)
//! 5. Validate parameters against the tool schema
//! 6. Execute with a timeout, honoring cancellation
//! 7. Record the result, track per-signature failures, report to the terminal
//!
//! Gates 2 to 6 never error; they produce a failed or skipped [`ToolResult`]
//! so the model can see what went wrong.
//!
//! Shared state sits behind a `std::sync::Mutex` that is only held in short
//! synchronous sections, never across an await.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info, warn};

use super::approval::{ApprovalPrompter, ApprovalRequest, ApprovalResponse, StaticPrompter};
use super::approval_cache::{ApprovalCache, ApprovalStats};
use super::call_tracker::{call_signature, DuplicateCallDetector, FailureTracker};
use super::errors::ExecutionError;
use super::formatting::{format_tool_result, recovery_suggestion};
use super::safety_config::SafetyConfig;
use super::result_cache::ToolResultCache;
use crate::config::ToolingConfig;
use crate::llm::ToolCall;
use crate::terminal::TerminalOutput;
use crate::tools::{Tool, ToolCategory, ToolExecutionContext, ToolParams, ToolRegistry, ToolResult};

#[derive(Debug)]
struct ExecutorState {
    results: ToolResultCache,
    approvals: ApprovalCache,
    duplicates: DuplicateCallDetector,
    failures: FailureTracker,
}

/// Validates, authorizes and runs tool calls
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    tooling: ToolingConfig,
    safety: SafetyConfig,
    prompter: Arc<dyn ApprovalPrompter>,
    terminal: TerminalOutput,
    debug: bool,
    state: Mutex<ExecutorState>,
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("registry", &self.registry)
            .field("tooling", &self.tooling)
            .field("debug", &self.debug)
            .finish()
    }
}

impl ToolExecutor {
    /// Executor that denies anything needing approval until a prompter is set
    pub fn new(registry: Arc<ToolRegistry>, tooling: ToolingConfig, safety: SafetyConfig) -> Self {
        let state = ExecutorState {
            results: ToolResultCache::new(safety.max_tool_results, safety.result_ttl()),
            approvals: ApprovalCache::new(),
            duplicates: DuplicateCallDetector::new(safety.dedup_ttl()),
            failures: FailureTracker::new(),
        };
        Self {
            registry,
            tooling,
            safety,
            prompter: Arc::new(StaticPrompter::deny_all()),
            terminal: TerminalOutput::default(),
            debug: false,
            state: Mutex::new(state),
        }
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn ApprovalPrompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn with_terminal(mut self, terminal: TerminalOutput) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ExecutorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tooling(&self) -> &ToolingConfig {
        &self.tooling
    }

    /// Names of the registered tools
    pub fn available_tools(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Execute one tool call
    ///
    /// Only unknown tools (and disabled tool calling) are errors; every other
    /// problem becomes a failed or skipped result.
    pub async fn execute_call(
        &self,
        call: &ToolCall,
        ctx: &ToolExecutionContext,
    ) -> Result<ToolResult, ExecutionError> {
        if !self.tooling.enable_tool_calling {
            return Err(ExecutionError::ToolsDisabled);
        }
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ExecutionError::ToolNotFound(call.name.clone()))?;

        self.report_start(call);

        let params = match parse_arguments(&call.arguments) {
            Ok(params) => params,
            Err(message) => return Ok(self.finish(call, None, ToolResult::failure(message))),
        };
        let signature = call_signature(&call.name, &params);

        let duplicate = self.lock().duplicates.check_and_record(&call.name, &params);
        if let Err(message) = duplicate {
            debug!(tool = %call.name, call_id = %call.id, "Refusing duplicate call");
            return Ok(self.finish(call, Some(&signature), ToolResult::failure(message)));
        }

        let category = tool.metadata().category;
        if self.tooling.requires_approval(category) {
            if let Some(skipped) = self.check_approval(call, category, &params).await {
                return Ok(self.finish(call, Some(&signature), skipped));
            }
        }

        if let Err(message) = tool.validate_parameters(&params) {
            return Ok(self.finish(call, Some(&signature), ToolResult::failure(message)));
        }

        let result = self.run_tool(tool.as_ref(), call, params, ctx).await;
        Ok(self.finish(call, Some(&signature), result))
    }

    /// Convert an execution error into a recorded failure result
    pub fn failure_from_error(&self, call: &ToolCall, error: &ExecutionError) -> ToolResult {
        warn!(tool = %call.name, call_id = %call.id, error = %error, "Tool call rejected");
        let result = ToolResult::failure_with_suggestion(
            error.to_string(),
            error.recovery_suggestion(&self.available_tools()),
        );
        self.finish(call, None, result)
    }

    async fn check_approval(
        &self,
        call: &ToolCall,
        category: ToolCategory,
        params: &ToolParams,
    ) -> Option<ToolResult> {
        let cached = self.lock().approvals.is_approved(&call.name, category);
        match cached {
            Some(true) => return None,
            Some(false) => {
                return Some(ToolResult::skipped(format!(
                    "Tool '{}' was denied earlier in this session",
                    call.name
                )))
            }
            None if self.tooling.skip_unapproved_tools => {
                return Some(ToolResult::skipped(format!(
                    "Tool '{}' requires approval for {} tools and unapproved tools are skipped",
                    call.name, category
                )))
            }
            None => {}
        }

        let request = ApprovalRequest::new(&call.name, category, JsonValue::Object(params.clone()));
        let timeout = self.safety.approval_timeout();
        let response =
            match tokio::time::timeout(timeout, self.prompter.request_approval(&request)).await {
                Ok(response) => response,
                Err(_) => {
                    warn!(tool = %call.name, "Approval timed out");
                    self.terminal.warn(&format!(
                        "No answer within {}s; denying '{}'",
                        timeout.as_secs(),
                        call.name
                    ));
                    ApprovalResponse::Deny
                }
            };

        {
            let mut state = self.lock();
            match response {
                ApprovalResponse::Approve => state.approvals.set_approval(&call.name, true),
                ApprovalResponse::ApproveCategory => {
                    state.approvals.set_category_approval(category, true)
                }
                ApprovalResponse::Deny => state.approvals.set_approval(&call.name, false),
            }
        }
        info!(tool = %call.name, ?response, "Approval decision recorded");

        if response.is_approved() {
            None
        } else {
            Some(ToolResult::skipped(format!(
                "User denied permission to run '{}'",
                call.name
            )))
        }
    }

    async fn run_tool(
        &self,
        tool: &dyn Tool,
        call: &ToolCall,
        params: ToolParams,
        ctx: &ToolExecutionContext,
    ) -> ToolResult {
        let limit = self.tooling.tool_timeout().min(ctx.timeout);
        debug!(tool = %call.name, call_id = %call.id, timeout_ms = limit.as_millis() as u64, "Executing tool");

        // Dropping the tool future on timeout or cancellation abandons it;
        // child processes are spawned with kill_on_drop.
        tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => ToolResult::failure("Tool execution cancelled"),
            outcome = tokio::time::timeout(limit, tool.execute(params, ctx)) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    warn!(tool = %call.name, call_id = %call.id, "Tool timed out");
                    ToolResult::failure(format!(
                        "Tool execution timeout after {}ms",
                        limit.as_millis()
                    ))
                }
            },
        }
    }

    fn finish(&self, call: &ToolCall, signature: Option<&str>, mut result: ToolResult) -> ToolResult {
        if let ToolResult::Failure {
            message,
            recovery_suggestion: suggestion,
            ..
        } = &mut result
        {
            if suggestion.is_none() {
                *suggestion = recovery_suggestion(message).map(str::to_string);
            }
        }

        {
            let mut state = self.lock();
            if let Some(signature) = signature {
                match &result {
                    ToolResult::Success { .. } => state.failures.record_success(signature),
                    ToolResult::Failure { .. } => {
                        let count = state.failures.record_failure(signature);
                        if count >= self.safety.failure_warning_threshold {
                            result.push_warning(format!(
                                "This exact call has failed {} times in a row. Change the parameters or try a different approach.",
                                count
                            ));
                        }
                    }
                    ToolResult::Skipped { .. } => {}
                }
            }
            state.results.put(call.id.clone(), result.clone());
        }

        self.report_result(call, &result);
        result
    }

    fn report_start(&self, call: &ToolCall) {
        info!(tool = %call.name, call_id = %call.id, origin = ?call.origin, "Tool call");
        if self.debug {
            self.terminal.info(&format!(
                "[tool] {} ({}) {}",
                call.name, call.id, call.arguments
            ));
        } else {
            self.terminal.info(&format!("[tool] {}", call.name));
        }
    }

    fn report_result(&self, call: &ToolCall, result: &ToolResult) {
        if self.debug {
            let text = self.format_result(&call.name, result);
            match result {
                ToolResult::Success { .. } => self.terminal.success(&text),
                _ => self.terminal.warn(&text),
            }
            return;
        }
        match result {
            ToolResult::Success { .. } => self.terminal.success(&format!("[ok] {}", call.name)),
            ToolResult::Failure { message, .. } => {
                self.terminal.warn(&format!("[failed] {}: {}", call.name, message))
            }
            ToolResult::Skipped { reason } => {
                self.terminal.warn(&format!("[skipped] {}: {}", call.name, reason))
            }
        }
    }

    /// Natural-language result text for the conversation
    pub fn format_result(&self, tool: &str, result: &ToolResult) -> String {
        format_tool_result(tool, result, self.safety.output_truncate_chars)
    }

    /// Cached result for a call id
    pub fn cached_result(&self, call_id: &str) -> Option<ToolResult> {
        self.lock().results.get(call_id).cloned()
    }

    pub fn result_cache_len(&self) -> usize {
        self.lock().results.len()
    }

    pub fn approval_stats(&self) -> ApprovalStats {
        self.lock().approvals.stats()
    }

    pub fn set_approval(&self, tool: &str, approved: bool) {
        self.lock().approvals.set_approval(tool, approved);
    }

    pub fn set_category_approval(&self, category: ToolCategory, approved: bool) {
        self.lock().approvals.set_category_approval(category, approved);
    }

    pub fn clear_approvals(&self) {
        self.lock().approvals.clear();
    }

    /// Forget dedup and failure history (new conversation)
    pub fn reset_call_history(&self) {
        let mut state = self.lock();
        state.duplicates.clear();
        state.failures.clear();
    }
}

/// Normalize tool arguments into a parameter map
///
/// Accepts an object, a JSON-encoded object string, or nothing.
pub fn parse_arguments(arguments: &JsonValue) -> Result<ToolParams, String> {
    match arguments {
        JsonValue::Object(map) => Ok(map.clone()),
        JsonValue::Null => Ok(Map::new()),
        JsonValue::String(raw) if raw.trim().is_empty() => Ok(Map::new()),
        JsonValue::String(raw) => match serde_json::from_str::<JsonValue>(raw) {
            Ok(JsonValue::Object(map)) => Ok(map),
            Ok(other) => Err(format!(
                "Invalid arguments: expected a JSON object, got {}",
                json_type_name(&other)
            )),
            Err(e) => Err(format!("Invalid JSON in tool arguments: {}", e)),
        },
        other => Err(format!(
            "Invalid arguments: expected a JSON object, got {}",
            json_type_name(other)
        )),
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution_engine::approval::StaticPrompter;
    use crate::tools::{ParameterType, ToolMetadata, ToolParameter};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    struct EchoTool {
        metadata: ToolMetadata,
    }

    impl EchoTool {
        fn new(category: ToolCategory) -> Self {
            Self {
                metadata: ToolMetadata {
                    name: "echo".to_string(),
                    description: "Echo the text".to_string(),
                    category,
                    version: "1.0.0".to_string(),
                    parameters: vec![ToolParameter::required(
                        "text",
                        ParameterType::String,
                        "text",
                    )],
                    examples: vec![],
                },
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn metadata(&self) -> &ToolMetadata {
            &self.metadata
        }

        async fn execute(&self, params: ToolParams, _ctx: &ToolExecutionContext) -> ToolResult {
            match params.get("text").and_then(|t| t.as_str()) {
                Some("fail") => ToolResult::failure("echo refused"),
                Some(text) => ToolResult::success(json!(text)),
                None => ToolResult::failure("no text"),
            }
        }
    }

    fn executor(category: ToolCategory, prompter: Arc<StaticPrompter>) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new(category)));
        ToolExecutor::new(Arc::new(registry), ToolingConfig::default(), SafetyConfig::default())
            .with_prompter(prompter)
            .with_terminal(TerminalOutput::new(Arc::new(crate::terminal::BufferTerminal::new())))
    }

    fn ctx() -> ToolExecutionContext {
        ToolExecutionContext::new(std::env::temp_dir())
    }

    #[test]
    fn test_parse_arguments_variants() {
        assert_eq!(parse_arguments(&json!({"a": 1})).unwrap()["a"], 1);
        assert_eq!(parse_arguments(&json!(r#"{"a": 2}"#)).unwrap()["a"], 2);
        assert!(parse_arguments(&JsonValue::Null).unwrap().is_empty());
        assert!(parse_arguments(&json!("")).unwrap().is_empty());
        assert!(parse_arguments(&json!("{not json"))
            .unwrap_err()
            .starts_with("Invalid JSON"));
        assert!(parse_arguments(&json!([1, 2])).unwrap_err().contains("array"));
    }

    #[tokio::test]
    async fn test_success_is_cached_by_call_id() {
        let exec = executor(ToolCategory::Analysis, Arc::new(StaticPrompter::approve_all()));
        let call = ToolCall::new("echo", json!({"text": "hi"}));
        let result = exec.execute_call(&call, &ctx()).await.unwrap();
        assert!(result.is_success());
        assert_eq!(exec.cached_result(&call.id), Some(result));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error() {
        let exec = executor(ToolCategory::Analysis, Arc::new(StaticPrompter::approve_all()));
        let call = ToolCall::new("git", json!({}));
        let err = exec.execute_call(&call, &ctx()).await.unwrap_err();
        assert_eq!(err, ExecutionError::ToolNotFound("git".to_string()));

        let failure = exec.failure_from_error(&call, &err);
        assert!(failure.is_failure());
        assert_eq!(exec.cached_result(&call.id), Some(failure));
    }

    #[tokio::test]
    async fn test_escalating_warning_on_repeated_failure() {
        let mut safety = SafetyConfig::default();
        safety.tool_call_dedup_ttl_ms = 0;
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new(ToolCategory::Analysis)));
        let exec = ToolExecutor::new(Arc::new(registry), ToolingConfig::default(), safety)
            .with_terminal(TerminalOutput::new(Arc::new(crate::terminal::BufferTerminal::new())));

        let first = exec
            .execute_call(&ToolCall::new("echo", json!({"text": "fail"})), &ctx())
            .await
            .unwrap();
        assert!(first.warnings().is_empty());

        let second = exec
            .execute_call(&ToolCall::new("echo", json!({"text": "fail"})), &ctx())
            .await
            .unwrap();
        assert!(second.warnings()[0].contains("failed 2 times"));
    }

    #[tokio::test]
    async fn test_approval_prompted_once_then_cached() {
        let prompter = Arc::new(StaticPrompter::approve_all());
        let exec = executor(ToolCategory::Execution, prompter.clone());
        for text in ["a", "b", "c"] {
            let result = exec
                .execute_call(&ToolCall::new("echo", json!({"text": text})), &ctx())
                .await
                .unwrap();
            assert!(result.is_success());
        }
        assert_eq!(prompter.prompt_count(), 1);
        assert_eq!(exec.approval_stats().approved_tools, 1);
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_fast() {
        let exec = executor(ToolCategory::Analysis, Arc::new(StaticPrompter::approve_all()));
        let ctx = ctx().with_timeout(Duration::from_secs(5));
        ctx.cancellation.cancel();
        let result = exec
            .execute_call(&ToolCall::new("echo", json!({"text": "x"})), &ctx)
            .await
            .unwrap();
        assert_eq!(result.error_message(), Some("Tool execution cancelled"));
    }
}
