//! Tool registry
//!
//! Name → tool lookup used by the executor, and the source of the tool
//! schemas sent to the model.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::tools::{ExecutionTool, FilesystemTool, SearchTool, Tool};

/// Registered tools, ordered by name
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `filesystem`, `execution` and `search`
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FilesystemTool::new()));
        registry.register(Arc::new(ExecutionTool::new()));
        registry.register(Arc::new(SearchTool::new()));
        registry
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.metadata().name.clone();
        debug!(tool = %name, category = %tool.metadata().category, "Registering tool");
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Function-calling schemas for every tool
    pub fn schemas(&self) -> Vec<JsonValue> {
        self.tools
            .values()
            .map(|tool| tool.metadata().to_function_schema())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tools_registered() {
        let registry = ToolRegistry::with_builtin_tools();
        assert_eq!(registry.names(), vec!["execution", "filesystem", "search"]);
        assert!(registry.get("filesystem").is_some());
        assert!(registry.get("git").is_none());
    }

    #[test]
    fn test_schemas_cover_every_tool() {
        let registry = ToolRegistry::with_builtin_tools();
        let schemas = registry.schemas();
        assert_eq!(schemas.len(), registry.len());
        assert!(schemas.iter().all(|s| s["type"] == "function"));
    }
}
