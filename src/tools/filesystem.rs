//! Filesystem tool
//!
//! `list`, `read`, `write` and `exists` on paths under the project root.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::tools::{
    string_param, ParameterType, Tool, ToolCategory, ToolExample, ToolExecutionContext,
    ToolMetadata, ToolParameter, ToolParams, ToolResult,
};

/// Files larger than this are truncated on read
pub const MAX_READ_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone)]
pub struct FilesystemTool {
    metadata: ToolMetadata,
}

impl Default for FilesystemTool {
    fn default() -> Self {
        Self::new()
    }
}

impl FilesystemTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata {
                name: "filesystem".to_string(),
                description: "List directories, read, write and check files in the project"
                    .to_string(),
                category: ToolCategory::Filesystem,
                version: "1.0.0".to_string(),
                parameters: vec![
                    ToolParameter::required(
                        "operation",
                        ParameterType::String,
                        "Operation to perform",
                    )
                    .with_allowed(&["list", "read", "write", "exists"]),
                    ToolParameter::optional(
                        "path",
                        ParameterType::String,
                        "Path relative to the project root",
                    )
                    .with_default(json!(".")),
                    ToolParameter::optional(
                        "content",
                        ParameterType::String,
                        "File content (write only)",
                    ),
                ],
                examples: vec![
                    ToolExample::new(
                        "list the src directory",
                        json!({"operation": "list", "path": "src"}),
                    ),
                    ToolExample::new(
                        "read a file",
                        json!({"operation": "read", "path": "Cargo.toml"}),
                    ),
                    ToolExample::new(
                        "create a file",
                        json!({"operation": "write", "path": "notes.md", "content": "# Notes\n"}),
                    ),
                ],
            },
        }
    }

    async fn list(&self, rel: &str, ctx: &ToolExecutionContext) -> ToolResult {
        let path = match ctx.resolve_path(rel) {
            Ok(p) => p,
            Err(e) => return ToolResult::failure(e),
        };
        let mut reader = match tokio::fs::read_dir(&path).await {
            Ok(r) => r,
            Err(e) => return ToolResult::failure(format!("Failed to list {}: {}", rel, e)),
        };

        let mut entries = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => {
                    let mut name = entry.file_name().to_string_lossy().to_string();
                    if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                        name.push('/');
                    }
                    entries.push(name);
                }
                Ok(None) => break,
                Err(e) => return ToolResult::failure(format!("Failed to list {}: {}", rel, e)),
            }
        }
        entries.sort();

        ToolResult::success(json!({
            "operation": "list",
            "path": ctx.display_path(&path),
            "entries": entries,
            "count": entries.len(),
        }))
    }

    async fn read(&self, rel: &str, ctx: &ToolExecutionContext) -> ToolResult {
        let path = match ctx.resolve_path(rel) {
            Ok(p) => p,
            Err(e) => return ToolResult::failure(e),
        };
        if path.is_dir() {
            return ToolResult::failure(format!("Failed to read {}: Is a directory", rel));
        }
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => return ToolResult::failure(format!("Failed to read {}: {}", rel, e)),
        };

        let size = bytes.len();
        let truncated = size > MAX_READ_BYTES;
        let shown = &bytes[..size.min(MAX_READ_BYTES)];
        let result = ToolResult::success(json!({
            "operation": "read",
            "path": ctx.display_path(&path),
            "content": String::from_utf8_lossy(shown),
            "size": size,
        }));
        if truncated {
            result.with_warning(format!(
                "File is {} bytes; only the first {} bytes were read",
                size, MAX_READ_BYTES
            ))
        } else {
            result
        }
    }

    async fn write(&self, rel: &str, content: &str, ctx: &ToolExecutionContext) -> ToolResult {
        let path = match ctx.resolve_path(rel) {
            Ok(p) => p,
            Err(e) => return ToolResult::failure(e),
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::failure(format!("Failed to create {}: {}", parent.display(), e));
            }
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => ToolResult::success(json!({
                "operation": "write",
                "path": ctx.display_path(&path),
                "bytes_written": content.len(),
            })),
            Err(e) => ToolResult::failure(format!("Failed to write {}: {}", rel, e)),
        }
    }

    async fn exists(&self, rel: &str, ctx: &ToolExecutionContext) -> ToolResult {
        let path = match ctx.resolve_path(rel) {
            Ok(p) => p,
            Err(e) => return ToolResult::failure(e),
        };
        let metadata = tokio::fs::metadata(&path).await.ok();
        ToolResult::success(json!({
            "operation": "exists",
            "path": ctx.display_path(&path),
            "exists": metadata.is_some(),
            "is_dir": metadata.map(|m| m.is_dir()).unwrap_or(false),
        }))
    }
}

#[async_trait]
impl Tool for FilesystemTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn validate_parameters(&self, params: &ToolParams) -> Result<(), String> {
        crate::tools::validate_against_schema(&self.metadata.parameters, params)?;
        if string_param(params, "operation", "") == "write" && !params.contains_key("content") {
            return Err("Missing required parameter: content".to_string());
        }
        Ok(())
    }

    async fn execute(&self, params: ToolParams, ctx: &ToolExecutionContext) -> ToolResult {
        let operation = string_param(&params, "operation", "");
        let path = string_param(&params, "path", ".");
        debug!(operation, path, "filesystem tool");

        match operation {
            "list" => self.list(path, ctx).await,
            "read" => self.read(path, ctx).await,
            "write" => {
                let content = string_param(&params, "content", "");
                self.write(path, content, ctx).await
            }
            "exists" => self.exists(path, ctx).await,
            other => ToolResult::failure(format!("Unknown filesystem operation: {}", other)),
        }
    }
}
