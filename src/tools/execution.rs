//! Command execution tool
//!
//! Runs a shell command in the context's working directory. The child is
//! spawned with `kill_on_drop`, so a timed-out or cancelled call does not
//! leave the process running.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::tools::{
    string_param, ParameterType, Tool, ToolCategory, ToolExample, ToolExecutionContext,
    ToolMetadata, ToolParameter, ToolParams, ToolResult,
};

/// Captured stdout/stderr is cut to this many bytes each
pub const MAX_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ExecutionTool {
    metadata: ToolMetadata,
}

impl Default for ExecutionTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata {
                name: "execution".to_string(),
                description: "Run a shell command in the project directory".to_string(),
                category: ToolCategory::Execution,
                version: "1.0.0".to_string(),
                parameters: vec![
                    ToolParameter::required(
                        "command",
                        ParameterType::String,
                        "Shell command line to run",
                    ),
                    ToolParameter::optional(
                        "cwd",
                        ParameterType::String,
                        "Directory relative to the project root",
                    ),
                ],
                examples: vec![
                    ToolExample::new("list files", json!({"command": "ls -la"})),
                    ToolExample::new("run the tests", json!({"command": "cargo test"})),
                ],
            },
        }
    }
}

fn shell_command(command_line: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command_line);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line);
        cmd
    }
}

fn capture(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_OUTPUT_BYTES)]).to_string();
    if bytes.len() > MAX_OUTPUT_BYTES {
        format!("{}\n... [truncated {} bytes]", text, bytes.len() - MAX_OUTPUT_BYTES)
    } else {
        text
    }
}

#[async_trait]
impl Tool for ExecutionTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn execute(&self, params: ToolParams, ctx: &ToolExecutionContext) -> ToolResult {
        let command_line = string_param(&params, "command", "").trim();
        if command_line.is_empty() {
            return ToolResult::failure("Missing required parameter: command");
        }

        let cwd = match params.get("cwd").and_then(|v| v.as_str()) {
            Some(dir) => match ctx.resolve_path(dir) {
                Ok(p) => p,
                Err(e) => return ToolResult::failure(e),
            },
            None => ctx.working_directory.clone(),
        };

        debug!(command = command_line, cwd = %cwd.display(), "Executing command");
        let start = Instant::now();

        let mut cmd = shell_command(command_line);
        cmd.current_dir(&cwd)
            .envs(&ctx.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return ToolResult::failure(format!("Failed to spawn command: {}", e)),
        };

        let output = tokio::select! {
            _ = ctx.cancellation.cancelled() => {
                warn!(command = command_line, "Command cancelled");
                return ToolResult::failure("Tool execution cancelled");
            }
            output = child.wait_with_output() => output,
        };

        let output = match output {
            Ok(o) => o,
            Err(e) => return ToolResult::failure(format!("Failed to wait for command: {}", e)),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code();
        let stdout = capture(&output.stdout);
        let stderr = capture(&output.stderr);

        if output.status.success() {
            info!(command = command_line, duration_ms, "Command completed");
            ToolResult::success(json!({
                "command": command_line,
                "exit_code": exit_code,
                "stdout": stdout,
                "stderr": stderr,
                "duration_ms": duration_ms,
            }))
        } else {
            warn!(command = command_line, ?exit_code, duration_ms, "Command failed");
            let code = exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            ToolResult::failure(format!(
                "Command '{}' exited with status {}: {}",
                command_line, code, detail
            ))
        }
    }
}
