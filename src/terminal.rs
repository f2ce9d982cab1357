//! Terminal output
//!
//! The conversation loop and executor write user-facing text through
//! [`TerminalOutput`]. It forwards to a [`Terminal`] implementation and falls
//! back to plain stdout/stderr when none is attached or the terminal panics.
//! Typed input arrives through [`InputLines`].

use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use crossterm::style::Stylize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// Severity of a terminal line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalLevel {
    /// Raw streamed text, no newline added
    Text,
    Info,
    Success,
    Warn,
    Error,
}

/// Sink for user-facing output
pub trait Terminal: Send + Sync {
    /// Streamed text, written as-is
    fn write(&self, text: &str);
    fn info(&self, text: &str);
    fn success(&self, text: &str);
    fn warn(&self, text: &str);
    fn error(&self, text: &str);
}

/// Colored console output via crossterm
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleTerminal;

impl Terminal for ConsoleTerminal {
    fn write(&self, text: &str) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn info(&self, text: &str) {
        println!("{}", text.cyan());
    }

    fn success(&self, text: &str) {
        println!("{}", text.green());
    }

    fn warn(&self, text: &str) {
        eprintln!("{}", text.yellow());
    }

    fn error(&self, text: &str) {
        eprintln!("{}", text.red().bold());
    }
}

/// Records output in memory for tests
#[derive(Debug, Default)]
pub struct BufferTerminal {
    entries: Mutex<Vec<(TerminalLevel, String)>>,
}

impl BufferTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: TerminalLevel, text: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, text.to_string()));
    }

    pub fn entries(&self) -> Vec<(TerminalLevel, String)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True if any line of `level` contains `needle`
    pub fn contains(&self, level: TerminalLevel, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|(l, text)| *l == level && text.contains(needle))
    }

    /// Concatenated raw text
    pub fn text(&self) -> String {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == TerminalLevel::Text)
            .map(|(_, t)| t)
            .collect()
    }
}

impl Terminal for BufferTerminal {
    fn write(&self, text: &str) {
        self.push(TerminalLevel::Text, text);
    }

    fn info(&self, text: &str) {
        self.push(TerminalLevel::Info, text);
    }

    fn success(&self, text: &str) {
        self.push(TerminalLevel::Success, text);
    }

    fn warn(&self, text: &str) {
        self.push(TerminalLevel::Warn, text);
    }

    fn error(&self, text: &str) {
        self.push(TerminalLevel::Error, text);
    }
}

/// Guarded handle to an optional terminal
#[derive(Clone, Default)]
pub struct TerminalOutput {
    inner: Option<Arc<dyn Terminal>>,
}

impl std::fmt::Debug for TerminalOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalOutput")
            .field("attached", &self.inner.is_some())
            .finish()
    }
}

impl TerminalOutput {
    pub fn new(terminal: Arc<dyn Terminal>) -> Self {
        Self {
            inner: Some(terminal),
        }
    }

    pub fn console() -> Self {
        Self::new(Arc::new(ConsoleTerminal))
    }

    /// No terminal; everything goes to plain stdout/stderr
    pub fn detached() -> Self {
        Self { inner: None }
    }

    fn emit(&self, level: TerminalLevel, text: &str) {
        if let Some(terminal) = &self.inner {
            let delivered = catch_unwind(AssertUnwindSafe(|| match level {
                TerminalLevel::Text => terminal.write(text),
                TerminalLevel::Info => terminal.info(text),
                TerminalLevel::Success => terminal.success(text),
                TerminalLevel::Warn => terminal.warn(text),
                TerminalLevel::Error => terminal.error(text),
            }));
            if delivered.is_ok() {
                return;
            }
            tracing::debug!("Terminal adapter panicked; falling back to console");
        }
        fallback(level, text);
    }

    pub fn write(&self, text: &str) {
        self.emit(TerminalLevel::Text, text);
    }

    pub fn info(&self, text: &str) {
        self.emit(TerminalLevel::Info, text);
    }

    pub fn success(&self, text: &str) {
        self.emit(TerminalLevel::Success, text);
    }

    pub fn warn(&self, text: &str) {
        self.emit(TerminalLevel::Warn, text);
    }

    pub fn error(&self, text: &str) {
        self.emit(TerminalLevel::Error, text);
    }
}

fn fallback(level: TerminalLevel, text: &str) {
    match level {
        TerminalLevel::Text => {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        TerminalLevel::Info | TerminalLevel::Success => println!("{}", text),
        TerminalLevel::Warn | TerminalLevel::Error => eprintln!("{}", text),
    }
}

/// Lines typed on stdin, read by one background task
///
/// The chat prompt and approval prompts both receive from here. A receive
/// dropped by a timeout or Ctrl-C consumes nothing, so the next line goes to
/// whoever asks next.
#[derive(Debug)]
pub struct InputLines {
    rx: AsyncMutex<mpsc::UnboundedReceiver<String>>,
}

impl InputLines {
    /// Start the stdin reader task; it stops at EOF or once this is dropped
    pub fn spawn_stdin() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
            while let Some(line) = lines.next().await {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Stopped reading stdin");
                        break;
                    }
                }
            }
            debug!("Stdin reader finished");
        });
        Arc::new(Self::from_receiver(rx))
    }

    pub fn from_receiver(rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            rx: AsyncMutex::new(rx),
        }
    }

    /// Next typed line; `None` once input is closed
    pub async fn next_line(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}
