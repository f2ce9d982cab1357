//! Execution engine errors

/// Errors that abort a single tool call
///
/// Most problems (bad parameters, duplicates, timeouts) become a failed
/// [`ToolResult`](crate::tools::ToolResult) instead; these are the cases the
/// caller has to handle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("Tool not found: '{0}'")]
    ToolNotFound(String),

    #[error("Tool calling is disabled")]
    ToolsDisabled,
}

impl ExecutionError {
    /// Recovery hint shown with the failure
    pub fn recovery_suggestion(&self, available: &[String]) -> String {
        match self {
            ExecutionError::ToolNotFound(_) => {
                format!("Use one of the available tools: {}", available.join(", "))
            }
            ExecutionError::ToolsDisabled => {
                "Answer without tools; tool calling is disabled for this session".to_string()
            }
        }
    }
}
