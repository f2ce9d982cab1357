//! Execution engine: authorized, deduplicated, time-bounded tool calls
//!
//! - `executor`: the gate sequence every tool call passes through
//! - `result_cache`, `approval_cache`, `call_tracker`: session state it consults
//! - `approval`: how the user is asked
//! - `formatting`: results rendered as conversation text

mod approval;
mod approval_cache;
mod call_tracker;
mod errors;
mod executor;
mod formatting;
mod result_cache;
mod safety_config;

pub use approval::{
    ApprovalPrompter, ApprovalRequest, ApprovalResponse, ConsolePrompter, SilentPrompter,
    StaticPrompter,
};
pub use approval_cache::{ApprovalCache, ApprovalStats};
pub use call_tracker::{call_signature, DuplicateCallDetector, FailureTracker};
pub use errors::ExecutionError;
pub use executor::{parse_arguments, ToolExecutor};
pub use formatting::{format_tool_result, recovery_suggestion, truncate_output};
pub use result_cache::{CachedToolResult, ToolResultCache};
pub use safety_config::SafetyConfig;
