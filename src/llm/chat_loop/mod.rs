//! Chat loop: multi-turn tool calling
//!
//! # Flow
//!
//! 1. Stream the model with the history and tool schemas
//! 2. Content chunks are echoed and scanned for embedded JSON tool calls
//! 3. Native and embedded calls start executing while the stream continues
//! 4. After the stream: wait for every call, append the assistant message and
//!    one tool message per call, in the order the calls arrived
//! 5. No tool calls: done. Otherwise loop, unless the turn limit or the
//!    consecutive-failure breaker stops it

mod breaker;
mod conversation;
mod outcome;

pub use breaker::ConsecutiveFailureBreaker;
pub use conversation::{ConversationLoop, ToolOptions};
pub use outcome::{ConversationError, ConversationOutcome, TerminationReason};
