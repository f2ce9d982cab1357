//! Tool contract and built-in tools
//!
//! Every tool exposes [`ToolMetadata`] (name, category, parameter schema and
//! examples), validates its parameters, and executes asynchronously against a
//! [`ToolExecutionContext`], producing a [`ToolResult`].
//!
//! # Categories
//!
//! Categories drive approval policy: the executor prompts before running tools
//! whose category is listed in `require_approval_for_categories`.

pub mod execution;
pub mod filesystem;
pub mod registry;
pub mod search;

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use tokio_util::sync::CancellationToken;

pub use execution::ExecutionTool;
pub use filesystem::FilesystemTool;
pub use registry::ToolRegistry;
pub use search::SearchTool;

/// Parameter map passed to tools
pub type ToolParams = Map<String, JsonValue>;

/// Tool category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Reads or writes project files
    Filesystem,
    /// Runs commands
    Execution,
    /// Searches file contents
    Search,
    /// Read-only analysis
    Analysis,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Filesystem => "filesystem",
            ToolCategory::Execution => "execution",
            ToolCategory::Search => "search",
            ToolCategory::Analysis => "analysis",
        }
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filesystem" => Ok(ToolCategory::Filesystem),
            "execution" => Ok(ToolCategory::Execution),
            "search" => Ok(ToolCategory::Search),
            "analysis" => Ok(ToolCategory::Analysis),
            other => Err(format!("Unknown tool category: {}", other)),
        }
    }
}

/// JSON type of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParameterType {
    /// JSON schema type name
    pub fn json_type(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Object => "object",
            ParameterType::Array => "array",
        }
    }

    pub fn matches(&self, value: &JsonValue) -> bool {
        match self {
            ParameterType::String => value.is_string(),
            ParameterType::Integer => value.is_i64() || value.is_u64(),
            ParameterType::Number => value.is_number(),
            ParameterType::Boolean => value.is_boolean(),
            ParameterType::Object => value.is_object(),
            ParameterType::Array => value.is_array(),
        }
    }
}

/// Declared tool parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParameterType,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    /// Allowed values for string parameters (empty = any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
}

impl ToolParameter {
    pub fn required(name: &str, ty: ParameterType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            ty,
            description: description.to_string(),
            required: true,
            default: None,
            allowed: Vec::new(),
        }
    }

    pub fn optional(name: &str, ty: ParameterType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty, description)
        }
    }

    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_allowed(mut self, values: &[&str]) -> Self {
        self.allowed = values.iter().map(|v| v.to_string()).collect();
        self
    }
}

/// Example invocation shown to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExample {
    pub description: String,
    pub arguments: JsonValue,
}

impl ToolExample {
    pub fn new(description: &str, arguments: JsonValue) -> Self {
        Self {
            description: description.to_string(),
            arguments,
        }
    }
}

/// Complete tool metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub version: String,
    pub parameters: Vec<ToolParameter>,
    pub examples: Vec<ToolExample>,
}

impl ToolMetadata {
    /// Render as a function-calling tool schema
    ///
    /// Examples are folded into the description since the schema has no
    /// dedicated field for them.
    pub fn to_function_schema(&self) -> JsonValue {
        let mut properties = Map::new();
        for param in &self.parameters {
            let mut prop = json!({
                "type": param.ty.json_type(),
                "description": param.description,
            });
            if !param.allowed.is_empty() {
                prop["enum"] = json!(param.allowed);
            }
            if let Some(default) = &param.default {
                prop["default"] = default.clone();
            }
            properties.insert(param.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        let mut description = self.description.clone();
        for example in &self.examples {
            description.push_str(&format!(
                "\nExample ({}): {}",
                example.description, example.arguments
            ));
        }

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

/// Check parameters against a declared schema
///
/// Unknown parameters are ignored; models often add harmless extras.
pub fn validate_against_schema(
    parameters: &[ToolParameter],
    params: &ToolParams,
) -> Result<(), String> {
    for param in parameters {
        let value = match params.get(&param.name) {
            Some(JsonValue::Null) | None => {
                if param.required {
                    return Err(format!("Missing required parameter: {}", param.name));
                }
                continue;
            }
            Some(value) => value,
        };

        if !param.ty.matches(value) {
            return Err(format!(
                "Invalid type for parameter '{}': expected {}",
                param.name,
                param.ty.json_type()
            ));
        }

        if !param.allowed.is_empty() {
            if let Some(s) = value.as_str() {
                if !param.allowed.iter().any(|a| a == s) {
                    return Err(format!(
                        "Invalid value for parameter '{}': '{}' (expected one of: {})",
                        param.name,
                        s,
                        param.allowed.join(", ")
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Outcome of one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success {
        data: JsonValue,
        #[serde(default)]
        warnings: Vec<String>,
    },
    Failure {
        message: String,
        #[serde(default)]
        recovery_suggestion: Option<String>,
        #[serde(default)]
        warnings: Vec<String>,
    },
    /// Not run because approval was declined
    Skipped { reason: String },
}

impl ToolResult {
    pub fn success(data: JsonValue) -> Self {
        ToolResult::Success {
            data,
            warnings: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ToolResult::Failure {
            message: message.into(),
            recovery_suggestion: None,
            warnings: Vec::new(),
        }
    }

    pub fn failure_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        ToolResult::Failure {
            message: message.into(),
            recovery_suggestion: Some(suggestion.into()),
            warnings: Vec::new(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        ToolResult::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ToolResult::Failure { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ToolResult::Skipped { .. })
    }

    /// Append a warning (no-op for skipped results)
    pub fn push_warning(&mut self, warning: impl Into<String>) {
        match self {
            ToolResult::Success { warnings, .. } | ToolResult::Failure { warnings, .. } => {
                warnings.push(warning.into())
            }
            ToolResult::Skipped { .. } => {}
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.push_warning(warning);
        self
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            ToolResult::Success { warnings, .. } | ToolResult::Failure { warnings, .. } => {
                warnings
            }
            ToolResult::Skipped { .. } => &[],
        }
    }

    /// Failure message or skip reason
    pub fn error_message(&self) -> Option<&str> {
        match self {
            ToolResult::Success { .. } => None,
            ToolResult::Failure { message, .. } => Some(message),
            ToolResult::Skipped { reason } => Some(reason),
        }
    }
}

/// Environment a tool runs in
#[derive(Debug, Clone)]
pub struct ToolExecutionContext {
    pub project_root: PathBuf,
    pub working_directory: PathBuf,
    pub environment: HashMap<String, String>,
    pub timeout: Duration,
    /// Cancelled when the user interrupts the current request
    pub cancellation: CancellationToken,
}

impl ToolExecutionContext {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = normalize_path(&project_root.into());
        Self {
            working_directory: project_root.clone(),
            project_root,
            environment: HashMap::new(),
            timeout: Duration::from_secs(30),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = normalize_path(&self.project_root.join(dir.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Resolve a user path against the working directory
    ///
    /// Paths that leave the project root are rejected, both lexically and
    /// after symlinks in the existing part of the path are resolved.
    pub fn resolve_path(&self, path: &str) -> Result<PathBuf, String> {
        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.working_directory.join(candidate)
        };
        let resolved = normalize_path(&joined);
        let denied = || {
            format!(
                "Permission denied: path '{}' is outside the project root {}",
                path,
                self.project_root.display()
            )
        };
        if !resolved.starts_with(&self.project_root) {
            return Err(denied());
        }

        let root = std::fs::canonicalize(&self.project_root)
            .unwrap_or_else(|_| self.project_root.clone());
        match canonicalize_existing(&resolved) {
            Some(real) if real.starts_with(&root) => Ok(resolved),
            _ => Err(denied()),
        }
    }

    /// Path relative to the project root, for display
    pub fn display_path(&self, path: &Path) -> String {
        match path.strip_prefix(&self.project_root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => path.display().to_string(),
        }
    }
}

/// Canonicalize the longest existing ancestor of `path` and re-append the rest.
/// A dangling symlink on the way yields `None`.
fn canonicalize_existing(path: &Path) -> Option<PathBuf> {
    let mut tail = Vec::new();
    let mut current = path;
    loop {
        match std::fs::canonicalize(current) {
            Ok(real) => return Some(tail.iter().rev().fold(real, |acc, part| acc.join(part))),
            Err(_) if std::fs::symlink_metadata(current).is_ok() => return None,
            Err(_) => {}
        }
        tail.push(current.file_name()?.to_os_string());
        current = current.parent()?;
    }
}

/// Remove `.` and `..` components without touching the filesystem
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// A tool the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> &ToolMetadata;

    /// Check parameters before execution
    fn validate_parameters(&self, params: &ToolParams) -> Result<(), String> {
        validate_against_schema(&self.metadata().parameters, params)
    }

    async fn execute(&self, params: ToolParams, ctx: &ToolExecutionContext) -> ToolResult;
}

/// Read an optional string parameter, falling back to its declared default
pub(crate) fn string_param<'a>(params: &'a ToolParams, name: &str, default: &'a str) -> &'a str {
    params.get(name).and_then(|v| v.as_str()).unwrap_or(default)
}
