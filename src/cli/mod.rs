//! CLI: argument parsing and mode dispatch
//!
//! - `args`: clap definitions and config overrides
//! - `dispatch`: builds the client, executor and conversation loop, then
//!   runs the selected mode

pub mod args;
pub mod dispatch;

pub use args::{parse_args, Args, Mode};
pub use dispatch::{run_cli_mode, ExitCode};

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Model server error: {0}")]
    Model(#[from] crate::llm::AdapterError),

    #[error("Conversation error: {0}")]
    Conversation(#[from] crate::llm::ConversationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Exit codes (deterministic)
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, Error>;
