//! CLI mode dispatch
//!
//! Dispatches to the mode handlers:
//! - chat: interactive session with history
//! - ask: one prompt
//! - models: list server models
//! - config: print effective configuration

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::{Args, Error, Mode, Result, EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_SUCCESS};
use crate::config::AppConfig;
use crate::execution_engine::{ApprovalPrompter, ConsolePrompter, StaticPrompter, ToolExecutor};
use crate::llm::adapters::OllamaClient;
use crate::llm::{ConversationLoop, ConversationOutcome, Message, ToolOptions};
use crate::logging::init_logging;
use crate::terminal::{InputLines, TerminalOutput};
use crate::tools::{ToolExecutionContext, ToolRegistry};

/// Exit code wrapper for CLI operations
pub type ExitCode = i32;

/// Everything a prompt needs, built once per process
struct Session {
    conversation: ConversationLoop,
    options: ToolOptions,
    project_root: PathBuf,
    terminal: TerminalOutput,
    input: Arc<InputLines>,
}

/// Run the selected mode and return the exit code
pub async fn run_cli_mode(args: Args) -> ExitCode {
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    let _log_guard = match init_logging(&config.logging, args.debug) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    let mode = args.mode();
    debug!(?mode, host = %config.ollama.host, model = %config.ollama.model, "Dispatching");

    match run_mode(mode, &args, config).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            match e {
                Error::Config(_) | Error::InvalidArgs(_) => EXIT_CONFIG_ERROR,
                _ => EXIT_FAILURE,
            }
        }
    }
}

/// File, then environment, then flags
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

async fn run_mode(mode: Mode, args: &Args, config: AppConfig) -> Result<()> {
    match mode {
        Mode::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Mode::Models => {
            let client = OllamaClient::from_config(&config.ollama)?;
            for name in client.list_models().await? {
                println!("{}", name);
            }
            Ok(())
        }
        Mode::Ask { prompt } => {
            let session = build_session(args, &config)?;
            let prompt = prompt.join(" ");
            if let Some(outcome) = session.run_prompt(vec![Message::user(prompt)]).await? {
                info!(turns = outcome.turns, tools = outcome.tool_calls_executed, "Prompt finished");
            }
            Ok(())
        }
        Mode::Chat => {
            let session = build_session(args, &config)?;
            run_chat(session).await
        }
    }
}

fn build_session(args: &Args, config: &AppConfig) -> Result<Session> {
    let project_root = match &args.project_root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };
    if !project_root.is_dir() {
        return Err(Error::InvalidArgs(format!(
            "Project root '{}' is not a directory",
            project_root.display()
        )));
    }

    let terminal = TerminalOutput::console();
    let input = InputLines::spawn_stdin();
    let prompter: Arc<dyn ApprovalPrompter> = if args.yes {
        Arc::new(StaticPrompter::approve_all())
    } else {
        Arc::new(ConsolePrompter::new(input.clone()))
    };
    let executor = ToolExecutor::new(
        Arc::new(ToolRegistry::with_builtin_tools()),
        config.tools.clone(),
        config.safety.clone(),
    )
    .with_prompter(prompter)
    .with_terminal(terminal.clone())
    .with_debug(args.debug);

    let client = OllamaClient::from_config(&config.ollama)?;
    let conversation = ConversationLoop::new(Arc::new(client), Arc::new(executor), config.safety.clone())
        .with_terminal(terminal.clone())
        .with_debug(args.debug);

    Ok(Session {
        conversation,
        options: ToolOptions {
            model: None,
            system: config.ollama.system_prompt.clone(),
        },
        project_root,
        terminal,
        input,
    })
}

impl Session {
    /// Run one prompt; Ctrl-C cancels running tools and abandons the prompt
    ///
    /// Returns `None` when interrupted.
    async fn run_prompt(&self, history: Vec<Message>) -> Result<Option<ConversationOutcome>> {
        let token = CancellationToken::new();
        let ctx = ToolExecutionContext::new(self.project_root.clone()).with_cancellation(token.clone());

        let watcher = {
            let token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
            })
        };

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            outcome = self.conversation.execute_with_history(history, &ctx, &self.options) => Some(outcome),
        };
        watcher.abort();

        match result {
            None => {
                self.terminal.warn("\nInterrupted");
                Ok(None)
            }
            Some(outcome) => Ok(Some(outcome?)),
        }
    }
}

async fn run_chat(session: Session) -> Result<()> {
    session
        .terminal
        .info("Chat with the model. /clear resets the conversation, /exit quits.");

    let mut history: Vec<Message> = Vec::new();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = session.input.next_line().await else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                history.clear();
                session.conversation.executor().reset_call_history();
                session.terminal.info("Conversation cleared");
                continue;
            }
            _ => {}
        }

        let mut next = history.clone();
        next.push(Message::user(input));
        match session.run_prompt(next).await {
            Ok(Some(outcome)) => history = outcome.messages,
            Ok(None) => {}
            Err(Error::Conversation(e)) => session.terminal.error(&e.to_string()),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
