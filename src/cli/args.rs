//! CLI argument parsing
//!
//! ```text
//! ollama-code [options] [mode]
//!
//! MODES:
//!   chat            Interactive session (default)
//!   ask <prompt>    One prompt, then exit
//!   models          List models on the Ollama server
//!   config          Print the effective configuration
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::{Error, Result};
use crate::config::AppConfig;

/// Parsed CLI arguments
#[derive(Debug, Clone, PartialEq, Parser)]
#[command(name = "ollama-code", version, about = "Coding assistant for local Ollama models")]
pub struct Args {
    /// Mode (chat when omitted)
    #[command(subcommand)]
    pub mode: Option<Mode>,

    /// Config file (default: <config dir>/ollama-code/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Ollama server URL
    #[arg(long, global = true, value_name = "URL")]
    pub host: Option<String>,

    /// Model name
    #[arg(long, short = 'm', global = true)]
    pub model: Option<String>,

    /// Show raw tool output and debug logs
    #[arg(long, global = true)]
    pub debug: bool,

    /// Maximum model turns per prompt
    #[arg(long, global = true, value_name = "N")]
    pub max_turns: Option<usize>,

    /// Disable tool calling
    #[arg(long, global = true)]
    pub no_tools: bool,

    /// Approve every tool call without asking
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Directory tools are confined to (default: current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub project_root: Option<PathBuf>,
}

/// CLI modes
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Mode {
    /// Interactive session
    Chat,

    /// Send one prompt and exit
    Ask {
        /// Prompt text (words are joined with spaces)
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },

    /// List models available on the Ollama server
    Models,

    /// Print the effective configuration as TOML
    Config,
}

impl Args {
    /// Mode to run, defaulting to chat
    pub fn mode(&self) -> Mode {
        self.mode.clone().unwrap_or(Mode::Chat)
    }

    /// Apply command-line overrides on top of file and environment config
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.ollama.host = host.clone();
        }
        if let Some(model) = &self.model {
            config.ollama.model = model.clone();
        }
        if let Some(max_turns) = self.max_turns {
            config.safety.max_turns = max_turns;
        }
        if self.no_tools {
            config.tools.enable_tool_calling = false;
        }
    }
}

/// Parse arguments without exiting on error
///
/// `--help` and `--version` also come back as errors here; the binary uses
/// `Args::parse()` so clap can print them.
pub fn parse_args<I, T>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Args::try_parse_from(args).map_err(|e| Error::InvalidArgs(e.to_string()))
}
