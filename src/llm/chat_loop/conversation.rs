//! Conversation loop
//!
//! Drives model turns until a turn makes no tool calls, the turn limit is
//! reached, or the consecutive-failure breaker trips. All three are normal
//! outcomes; only a turn with too many native tool calls is an error.
//!
//! Everything runs on the caller's task. Tool calls execute concurrently with
//! the model stream through a `FuturesUnordered`, polled alongside the stream
//! in one `select!`.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use super::breaker::ConsecutiveFailureBreaker;
use super::outcome::{ConversationError, ConversationOutcome, TerminationReason};
use crate::config::ToolingConfig;
use crate::execution_engine::{SafetyConfig, ToolExecutor};
use crate::llm::adapters::{AdapterError, ChatRequest, ModelClient, StreamEvent};
use crate::llm::streaming_parser::{looks_like_tool_json, StreamingContentParser};
use crate::llm::{Message, ToolCall};
use crate::terminal::TerminalOutput;
use crate::tools::{ToolExecutionContext, ToolResult};

/// Per-request model options
#[derive(Debug, Clone, Default)]
pub struct ToolOptions {
    pub model: Option<String>,
    pub system: Option<String>,
}

/// What one turn produced
#[derive(Debug, Default)]
struct TurnOutput {
    content: String,
    /// Native and embedded calls, in arrival order
    calls: Vec<ToolCall>,
    results: HashMap<String, ToolResult>,
    errors: Vec<String>,
}

pub struct ConversationLoop {
    client: Arc<dyn ModelClient>,
    executor: Arc<ToolExecutor>,
    tooling: ToolingConfig,
    safety: SafetyConfig,
    terminal: TerminalOutput,
    debug: bool,
}

impl ConversationLoop {
    pub fn new(client: Arc<dyn ModelClient>, executor: Arc<ToolExecutor>, safety: SafetyConfig) -> Self {
        let tooling = executor.tooling().clone();
        Self {
            client,
            executor,
            tooling,
            safety,
            terminal: TerminalOutput::default(),
            debug: false,
        }
    }

    pub fn with_terminal(mut self, terminal: TerminalOutput) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// Start a conversation from a single user prompt
    pub async fn execute(
        &self,
        prompt: &str,
        ctx: &ToolExecutionContext,
        options: &ToolOptions,
    ) -> Result<ConversationOutcome, ConversationError> {
        self.execute_with_history(vec![Message::user(prompt)], ctx, options)
            .await
    }

    /// Continue an existing conversation
    pub async fn execute_with_history(
        &self,
        mut messages: Vec<Message>,
        ctx: &ToolExecutionContext,
        options: &ToolOptions,
    ) -> Result<ConversationOutcome, ConversationError> {
        if messages.is_empty() {
            return Err(ConversationError::EmptyHistory);
        }

        let tools = if self.tooling.enable_tool_calling {
            self.executor.registry().schemas()
        } else {
            Vec::new()
        };
        let mut parser = StreamingContentParser::new(self.safety.max_streaming_parse_attempts);
        let mut breaker = ConsecutiveFailureBreaker::new(self.safety.max_consecutive_failures);
        let mut turns = 0;
        let mut tool_calls_executed = 0;
        let mut stream_errors = Vec::new();
        let mut final_response;

        let termination = loop {
            turns += 1;
            info!(turn = turns, messages = messages.len(), "Starting turn");
            parser.reset();

            let turn = self
                .run_turn(&messages, &tools, ctx, options, &mut parser)
                .await?;
            stream_errors.extend(turn.errors.iter().cloned());
            final_response = turn.content.clone();

            if turn.calls.is_empty() {
                if !turn.content.is_empty() {
                    messages.push(Message::assistant(turn.content));
                }
                debug!(turn = turns, "No tool calls; conversation complete");
                break TerminationReason::Quiescent;
            }

            tool_calls_executed += turn.calls.len();
            messages.push(Message::assistant_with_tool_calls(
                turn.content,
                turn.calls.clone(),
            ));
            for call in &turn.calls {
                let result = self
                    .executor
                    .cached_result(&call.id)
                    .or_else(|| turn.results.get(&call.id).cloned())
                    .unwrap_or_else(|| ToolResult::failure("Tool result unavailable"));
                breaker.record(result.is_success());
                messages.push(Message::tool(
                    &call.name,
                    self.executor.format_result(&call.name, &result),
                ));
            }

            if breaker.is_tripped() {
                warn!(
                    turn = turns,
                    failures = breaker.consecutive_failures(),
                    "Stopping after consecutive tool failures"
                );
                self.terminal.warn(&format!(
                    "Stopping: {} tool calls failed in a row",
                    breaker.consecutive_failures()
                ));
                break TerminationReason::ConsecutiveFailures;
            }

            if turns >= self.safety.max_turns {
                warn!(turns, "Reached maximum conversation turns");
                self.terminal.warn(&format!(
                    "Reached maximum conversation turns ({})",
                    self.safety.max_turns
                ));
                break TerminationReason::MaxTurns;
            }
        };

        info!(turns, tool_calls_executed, %termination, "Conversation finished");
        Ok(ConversationOutcome {
            messages,
            turns,
            tool_calls_executed,
            conversation_complete: termination != TerminationReason::MaxTurns,
            termination,
            final_response,
            stream_errors,
        })
    }

    async fn run_turn(
        &self,
        messages: &[Message],
        tools: &[JsonValue],
        ctx: &ToolExecutionContext,
        options: &ToolOptions,
        parser: &mut StreamingContentParser,
    ) -> Result<TurnOutput, ConversationError> {
        let request = ChatRequest {
            model: options.model.clone(),
            system: options.system.clone(),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
        };

        let mut out = TurnOutput::default();
        let mut in_flight = FuturesUnordered::new();

        match self.client.stream_chat(request).await {
            Err(err) => {
                self.report_stream_error(&err);
                out.errors.push(err.to_string());
            }
            Ok(mut stream) => loop {
                tokio::select! {
                    Some((id, result)) = in_flight.next(), if !in_flight.is_empty() => {
                        out.results.insert(id, result);
                    }
                    event = stream.next() => match event {
                        Some(Ok(StreamEvent::Content(chunk))) => {
                            if self.debug || !looks_like_tool_json(&chunk) {
                                self.terminal.write(&chunk);
                            }
                            out.content.push_str(&chunk);
                            if self.tooling.enable_tool_calling {
                                for call in parser.push(&chunk) {
                                    in_flight.push(self.run_call(call.clone(), ctx));
                                    out.calls.push(call);
                                }
                            }
                        }
                        Some(Ok(StreamEvent::ToolCall(mut call))) => {
                            if out.calls.len() >= self.tooling.max_tools_per_request {
                                warn!(
                                    limit = self.tooling.max_tools_per_request,
                                    "Too many tool calls in one turn"
                                );
                                return Err(ConversationError::ToolLimitExceeded {
                                    limit: self.tooling.max_tools_per_request,
                                });
                            }
                            call.ensure_id();
                            in_flight.push(self.run_call(call.clone(), ctx));
                            out.calls.push(call);
                        }
                        Some(Ok(StreamEvent::Done)) | None => break,
                        Some(Err(err)) => {
                            self.report_stream_error(&err);
                            out.errors.push(err.to_string());
                            break;
                        }
                    },
                }
            },
        }

        while let Some((id, result)) = in_flight.next().await {
            out.results.insert(id, result);
        }

        if !out.content.is_empty() && !out.content.ends_with('\n') {
            self.terminal.write("\n");
        }
        Ok(out)
    }

    async fn run_call(&self, call: ToolCall, ctx: &ToolExecutionContext) -> (String, ToolResult) {
        let result = match self.executor.execute_call(&call, ctx).await {
            Ok(result) => result,
            Err(err) => self.executor.failure_from_error(&call, &err),
        };
        (call.id, result)
    }

    fn report_stream_error(&self, err: &AdapterError) {
        warn!(provider = self.client.provider_name(), error = %err, "Model stream error");
        self.terminal.error(&format!("Model error: {}", err));
    }
}
