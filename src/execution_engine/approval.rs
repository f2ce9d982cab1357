//! Approval prompting
//!
//! Provides:
//! - ApprovalRequest: tool awaiting user approval
//! - ApprovalResponse: once, whole category, or deny
//! - ApprovalPrompter: how the executor asks (console, or fixed answers)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;

use crate::terminal::InputLines;
use crate::tools::ToolCategory;

/// Tool call awaiting approval
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub tool: String,
    pub category: ToolCategory,
    pub arguments: JsonValue,
}

impl ApprovalRequest {
    pub fn new(tool: &str, category: ToolCategory, arguments: JsonValue) -> Self {
        Self {
            tool: tool.to_string(),
            category,
            arguments,
        }
    }

    /// Format approval prompt for display
    pub fn format_prompt(&self) -> String {
        let mut prompt = format!("Approve {} tool '{}'?\n", self.category, self.tool);
        if let Some(args) = self.arguments.as_object().filter(|a| !a.is_empty()) {
            for (key, value) in args {
                let shown = match value {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                prompt.push_str(&format!("  {}: {}\n", key, shown));
            }
        }
        prompt.push_str(&format!(
            "  [y]es / [a]ll {} tools / [n]o: ",
            self.category
        ));
        prompt
    }
}

/// Answer to an approval prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalResponse {
    /// Approve this tool for the session
    Approve,
    /// Approve every tool in the category for the session
    ApproveCategory,
    /// Deny this tool for the session
    Deny,
}

impl ApprovalResponse {
    /// Parse a typed answer; anything unrecognized denies
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => ApprovalResponse::Approve,
            "a" | "all" => ApprovalResponse::ApproveCategory,
            _ => ApprovalResponse::Deny,
        }
    }

    pub fn is_approved(&self) -> bool {
        !matches!(self, ApprovalResponse::Deny)
    }
}

/// Source of approval decisions
#[async_trait]
pub trait ApprovalPrompter: Send + Sync {
    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalResponse;
}

/// Asks on the terminal and reads the answer from the session's input lines
#[derive(Debug)]
pub struct ConsolePrompter {
    input: Arc<InputLines>,
    /// One prompt at a time when calls overlap
    prompt_lock: AsyncMutex<()>,
}

impl ConsolePrompter {
    pub fn new(input: Arc<InputLines>) -> Self {
        Self {
            input,
            prompt_lock: AsyncMutex::new(()),
        }
    }
}

#[async_trait]
impl ApprovalPrompter for ConsolePrompter {
    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalResponse {
        let _guard = self.prompt_lock.lock().await;

        let mut stdout = tokio::io::stdout();
        let prompt = format!("\n{}", request.format_prompt());
        if stdout.write_all(prompt.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            return ApprovalResponse::Deny;
        }

        match self.input.next_line().await {
            Some(line) => ApprovalResponse::parse(&line),
            None => ApprovalResponse::Deny,
        }
    }
}

/// Always gives the same answer; used by `--yes` and tests
#[derive(Debug)]
pub struct StaticPrompter {
    response: ApprovalResponse,
    prompts: AtomicUsize,
}

impl StaticPrompter {
    pub fn new(response: ApprovalResponse) -> Self {
        Self {
            response,
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn approve_all() -> Self {
        Self::new(ApprovalResponse::Approve)
    }

    pub fn deny_all() -> Self {
        Self::new(ApprovalResponse::Deny)
    }

    /// Number of times the prompter was asked
    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApprovalPrompter for StaticPrompter {
    async fn request_approval(&self, _request: &ApprovalRequest) -> ApprovalResponse {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.response
    }
}

/// Never answers; exercises the approval timeout
#[derive(Debug, Default)]
pub struct SilentPrompter;

#[async_trait]
impl ApprovalPrompter for SilentPrompter {
    async fn request_approval(&self, _request: &ApprovalRequest) -> ApprovalResponse {
        std::future::pending::<()>().await;
        ApprovalResponse::Deny
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_answers() {
        assert_eq!(ApprovalResponse::parse("y\n"), ApprovalResponse::Approve);
        assert_eq!(ApprovalResponse::parse(" YES "), ApprovalResponse::Approve);
        assert_eq!(ApprovalResponse::parse("a"), ApprovalResponse::ApproveCategory);
        assert_eq!(ApprovalResponse::parse("n"), ApprovalResponse::Deny);
        assert_eq!(ApprovalResponse::parse(""), ApprovalResponse::Deny);
        assert_eq!(ApprovalResponse::parse("maybe"), ApprovalResponse::Deny);
    }

    #[test]
    fn test_format_prompt_lists_arguments() {
        let request = ApprovalRequest::new(
            "execution",
            ToolCategory::Execution,
            json!({"command": "cargo test"}),
        );
        let prompt = request.format_prompt();
        assert!(prompt.contains("Approve execution tool 'execution'?"));
        assert!(prompt.contains("command: cargo test"));
        assert!(prompt.contains("[a]ll execution tools"));
    }

    #[tokio::test]
    async fn test_static_prompter_counts() {
        let prompter = StaticPrompter::deny_all();
        let request = ApprovalRequest::new("x", ToolCategory::Execution, json!({}));
        assert_eq!(
            prompter.request_approval(&request).await,
            ApprovalResponse::Deny
        );
        assert_eq!(prompter.prompt_count(), 1);
    }

    #[tokio::test]
    async fn test_console_prompter_reads_shared_input() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let input = Arc::new(InputLines::from_receiver(rx));
        let prompter = ConsolePrompter::new(input.clone());
        let request = ApprovalRequest::new("execution", ToolCategory::Execution, json!({}));

        tx.send("a".to_string()).unwrap();
        tx.send("next prompt".to_string()).unwrap();
        assert_eq!(
            prompter.request_approval(&request).await,
            ApprovalResponse::ApproveCategory
        );
        assert_eq!(input.next_line().await.as_deref(), Some("next prompt"));

        drop(tx);
        assert_eq!(prompter.request_approval(&request).await, ApprovalResponse::Deny);
    }

    #[tokio::test]
    async fn test_abandoned_prompt_leaves_line_for_next_reader() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let input = Arc::new(InputLines::from_receiver(rx));
        let prompter = ConsolePrompter::new(input.clone());
        let request = ApprovalRequest::new("execution", ToolCategory::Execution, json!({}));

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            prompter.request_approval(&request),
        )
        .await;
        assert!(timed_out.is_err());

        tx.send("explain src/main.rs".to_string()).unwrap();
        assert_eq!(input.next_line().await.as_deref(), Some("explain src/main.rs"));
    }
}
