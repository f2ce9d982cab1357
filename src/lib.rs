//! ollama-code: a terminal coding assistant for local Ollama models
//!
//! The model streams text and tool calls; tool calls run through an executor
//! that deduplicates, asks for approval, enforces timeouts and caches
//! results, and the conversation loop feeds the results back until the model
//! stops calling tools.

pub mod cli;
pub mod config;
pub mod execution_engine;
pub mod llm;
pub mod logging;
pub mod terminal;
pub mod tools;

pub use config::{AppConfig, ConfigError};
pub use execution_engine::{SafetyConfig, ToolExecutor};
pub use llm::{ConversationLoop, ConversationOutcome, Message, ToolCall};
pub use terminal::{Terminal, TerminalOutput};
pub use tools::{Tool, ToolCategory, ToolExecutionContext, ToolMetadata, ToolRegistry, ToolResult};
