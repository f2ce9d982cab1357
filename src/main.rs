//! ollama-code CLI
//!
//! Modes:
//! - chat (default): interactive session, /clear and /exit
//! - ask <prompt>: single prompt
//! - models, config: inspection

use clap::Parser;

use ollama_code::cli::{run_cli_mode, Args};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let exit_code = run_cli_mode(args).await;
    std::process::exit(exit_code);
}
