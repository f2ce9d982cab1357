//! Session approval memory
//!
//! Tri-state per tool: approved, denied, or unset. A category entry applies
//! to every tool of that category that has no entry of its own.

use std::collections::HashMap;

use serde::Serialize;

use crate::tools::ToolCategory;

/// Counts of remembered decisions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApprovalStats {
    pub approved_tools: usize,
    pub denied_tools: usize,
    pub approved_categories: usize,
    pub denied_categories: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ApprovalCache {
    tools: HashMap<String, bool>,
    categories: HashMap<ToolCategory, bool>,
}

impl ApprovalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembered decision; `None` means the user has not been asked
    pub fn is_approved(&self, tool: &str, category: ToolCategory) -> Option<bool> {
        if let Some(approved) = self.tools.get(tool) {
            return Some(*approved);
        }
        self.categories.get(&category).copied()
    }

    pub fn set_approval(&mut self, tool: &str, approved: bool) {
        self.tools.insert(tool.to_string(), approved);
    }

    pub fn set_category_approval(&mut self, category: ToolCategory, approved: bool) {
        self.categories.insert(category, approved);
    }

    pub fn clear(&mut self) {
        self.tools.clear();
        self.categories.clear();
    }

    pub fn stats(&self) -> ApprovalStats {
        let approved_tools = self.tools.values().filter(|a| **a).count();
        let approved_categories = self.categories.values().filter(|a| **a).count();
        ApprovalStats {
            approved_tools,
            denied_tools: self.tools.len() - approved_tools,
            approved_categories,
            denied_categories: self.categories.len() - approved_categories,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_by_default() {
        let cache = ApprovalCache::new();
        assert_eq!(cache.is_approved("execution", ToolCategory::Execution), None);
    }

    #[test]
    fn test_tool_decision_is_remembered() {
        let mut cache = ApprovalCache::new();
        cache.set_approval("execution", false);
        assert_eq!(
            cache.is_approved("execution", ToolCategory::Execution),
            Some(false)
        );
    }

    #[test]
    fn test_category_covers_tools_without_entry() {
        let mut cache = ApprovalCache::new();
        cache.set_category_approval(ToolCategory::Filesystem, true);
        assert_eq!(
            cache.is_approved("filesystem", ToolCategory::Filesystem),
            Some(true)
        );
        assert_eq!(cache.is_approved("search", ToolCategory::Search), None);
    }

    #[test]
    fn test_tool_entry_wins_over_category() {
        let mut cache = ApprovalCache::new();
        cache.set_category_approval(ToolCategory::Execution, true);
        cache.set_approval("execution", false);
        assert_eq!(
            cache.is_approved("execution", ToolCategory::Execution),
            Some(false)
        );
    }

    #[test]
    fn test_stats_and_clear() {
        let mut cache = ApprovalCache::new();
        cache.set_approval("a", true);
        cache.set_approval("b", false);
        cache.set_category_approval(ToolCategory::Search, true);
        assert_eq!(
            cache.stats(),
            ApprovalStats {
                approved_tools: 1,
                denied_tools: 1,
                approved_categories: 1,
                denied_categories: 0,
            }
        );

        cache.clear();
        assert_eq!(cache.stats(), ApprovalStats::default());
    }
}
