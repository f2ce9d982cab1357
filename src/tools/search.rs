//! Content search tool
//!
//! Regex search over text files below a directory. The walk runs on the
//! blocking pool and stops once `max_results` matches were collected.

use std::path::Path;

use async_trait::async_trait;
use ignore::WalkBuilder;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, trace};

use crate::tools::{
    string_param, ParameterType, Tool, ToolCategory, ToolExample, ToolExecutionContext,
    ToolMetadata, ToolParameter, ToolParams, ToolResult,
};

const DEFAULT_MAX_RESULTS: usize = 50;
const MAX_FILE_BYTES: u64 = 1024 * 1024;
const MAX_LINE_CHARS: usize = 240;
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules"];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchMatch {
    pub file: String,
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct SearchTool {
    metadata: ToolMetadata,
}

impl Default for SearchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata {
                name: "search".to_string(),
                description: "Search file contents with a regular expression".to_string(),
                category: ToolCategory::Search,
                version: "1.0.0".to_string(),
                parameters: vec![
                    ToolParameter::required("pattern", ParameterType::String, "Regex pattern"),
                    ToolParameter::optional(
                        "path",
                        ParameterType::String,
                        "Directory to search, relative to the project root",
                    )
                    .with_default(json!(".")),
                    ToolParameter::optional(
                        "max_results",
                        ParameterType::Integer,
                        "Maximum number of matches",
                    )
                    .with_default(json!(DEFAULT_MAX_RESULTS)),
                    ToolParameter::optional(
                        "case_insensitive",
                        ParameterType::Boolean,
                        "Ignore case",
                    )
                    .with_default(json!(false)),
                ],
                examples: vec![
                    ToolExample::new("find main functions", json!({"pattern": "fn main"})),
                    ToolExample::new(
                        "find TODOs in src",
                        json!({"pattern": "TODO", "path": "src", "max_results": 20}),
                    ),
                ],
            },
        }
    }
}

/// Walk `dir` collecting matches; returns true when the limit cut the search short.
/// Symlinks are not followed, so the walk cannot loop or leave the project root.
fn search_dir(
    root: &Path,
    dir: &Path,
    regex: &Regex,
    limit: usize,
    matches: &mut Vec<SearchMatch>,
) -> bool {
    let mut walker = WalkBuilder::new(dir);
    walker
        .hidden(false)
        .git_ignore(true)
        .follow_links(false)
        .max_filesize(Some(MAX_FILE_BYTES))
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            !(is_dir
                && entry.depth() > 0
                && entry
                    .file_name()
                    .to_str()
                    .map(|n| SKIPPED_DIRS.contains(&n))
                    .unwrap_or(false))
        });

    for entry in walker.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                trace!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        if search_file(root, entry.path(), regex, limit, matches) {
            return true;
        }
    }
    false
}

fn search_file(
    root: &Path,
    path: &Path,
    regex: &Regex,
    limit: usize,
    matches: &mut Vec<SearchMatch>,
) -> bool {
    let too_big = std::fs::metadata(path)
        .map(|m| m.len() > MAX_FILE_BYTES)
        .unwrap_or(true);
    if too_big {
        return false;
    }
    // Binary and non-UTF-8 files fail here and are skipped
    let Ok(content) = std::fs::read_to_string(path) else {
        return false;
    };

    let file = path
        .strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string();
    for (idx, line) in content.lines().enumerate() {
        if regex.is_match(line) {
            if matches.len() >= limit {
                return true;
            }
            matches.push(SearchMatch {
                file: file.clone(),
                line: idx + 1,
                text: line.trim().chars().take(MAX_LINE_CHARS).collect(),
            });
        }
    }
    false
}

#[async_trait]
impl Tool for SearchTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn execute(&self, params: ToolParams, ctx: &ToolExecutionContext) -> ToolResult {
        let pattern = string_param(&params, "pattern", "").to_string();
        let rel = string_param(&params, "path", ".").to_string();
        let limit = params
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_RESULTS);
        let case_insensitive = params
            .get("case_insensitive")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let regex = match RegexBuilder::new(&pattern)
            .case_insensitive(case_insensitive)
            .build()
        {
            Ok(r) => r,
            Err(e) => return ToolResult::failure(format!("Invalid regex pattern: {}", e)),
        };

        let dir = match ctx.resolve_path(&rel) {
            Ok(p) => p,
            Err(e) => return ToolResult::failure(e),
        };
        if !dir.exists() {
            return ToolResult::failure(format!("Search path not found: {}", rel));
        }

        debug!(pattern = %pattern, path = %dir.display(), limit, "Searching");
        let root = ctx.project_root.clone();
        let walk = tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();
            let truncated = if dir.is_file() {
                search_file(&root, &dir, &regex, limit, &mut matches)
            } else {
                search_dir(&root, &dir, &regex, limit, &mut matches)
            };
            (matches, truncated)
        });

        let (matches, truncated) = match walk.await {
            Ok(found) => found,
            Err(e) => return ToolResult::failure(format!("Search task failed: {}", e)),
        };

        let result = ToolResult::success(json!({
            "pattern": pattern,
            "path": rel,
            "matches": matches,
            "count": matches.len(),
            "truncated": truncated,
        }));
        if truncated {
            result.with_warning(format!(
                "Stopped after {} matches; narrow the pattern or path",
                limit
            ))
        } else {
            result
        }
    }
}
