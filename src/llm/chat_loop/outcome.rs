//! Conversation results and errors

use crate::llm::Message;

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// A turn produced no tool calls
    Quiescent,
    /// Turn limit reached
    MaxTurns,
    /// Too many tool failures in a row
    ConsecutiveFailures,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::Quiescent => write!(f, "quiescent"),
            TerminationReason::MaxTurns => write!(f, "max turns"),
            TerminationReason::ConsecutiveFailures => write!(f, "consecutive failures"),
        }
    }
}

/// Result of one `ConversationLoop` execution
#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    /// Full history including the new assistant and tool messages
    pub messages: Vec<Message>,
    pub turns: usize,
    pub tool_calls_executed: usize,
    /// False only when the turn limit cut the conversation short
    pub conversation_complete: bool,
    pub termination: TerminationReason,
    /// Assistant text of the last turn
    pub final_response: String,
    /// Model stream errors reported during the conversation
    pub stream_errors: Vec<String>,
}

/// Errors that abort a conversation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversationError {
    #[error("Model requested more than {limit} tool calls in one turn")]
    ToolLimitExceeded { limit: usize },

    #[error("Conversation history is empty")]
    EmptyHistory,
}
