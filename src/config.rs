//! Configuration
//!
//! `AppConfig` is resolved in layers: built-in defaults, then the TOML config
//! file, then environment variables, then command-line flags (applied by the
//! CLI). Every section is optional in the file.
//!
//! ```toml
//! [ollama]
//! host = "http://127.0.0.1:11434"
//! model = "qwen2.5-coder:7b"
//!
//! [tools]
//! require_approval_for_categories = ["execution", "filesystem"]
//!
//! [safety]
//! max_turns = 8
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::execution_engine::SafetyConfig;
use crate::tools::ToolCategory;

/// Environment variable overriding `ollama.host`
pub const ENV_HOST: &str = "OLLAMA_HOST";
/// Environment variable overriding `ollama.model`
pub const ENV_MODEL: &str = "OLLAMA_MODEL";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),
}

/// Model server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub host: String,
    pub model: String,
    pub connect_timeout_secs: u64,
    /// Prepended as a system message when set
    pub system_prompt: Option<String>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://127.0.0.1:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            connect_timeout_secs: 10,
            system_prompt: None,
        }
    }
}

/// Tool calling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolingConfig {
    pub enable_tool_calling: bool,
    /// Native tool calls allowed in one model turn
    pub max_tools_per_request: usize,
    pub tool_timeout_ms: u64,
    /// Categories that need user approval before running
    pub require_approval_for_categories: Vec<ToolCategory>,
    /// Skip unapproved tools instead of prompting
    pub skip_unapproved_tools: bool,
}

impl Default for ToolingConfig {
    fn default() -> Self {
        Self {
            enable_tool_calling: true,
            max_tools_per_request: 10,
            tool_timeout_ms: 30_000, // 30 seconds
            require_approval_for_categories: vec![ToolCategory::Execution],
            skip_unapproved_tools: false,
        }
    }
}

impl ToolingConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn requires_approval(&self, category: ToolCategory) -> bool {
        self.require_approval_for_categories.contains(&category)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `warn` or `ollama_code=debug`
    pub level: String,
    /// Directory for daily-rotated JSON log files
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            directory: None,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ollama: OllamaConfig,
    pub tools: ToolingConfig,
    pub safety: SafetyConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// `<config dir>/ollama-code/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ollama-code").join("config.toml"))
    }

    /// Load from a file and apply environment overrides
    ///
    /// An explicit path must exist; the default path is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                Self::from_file(path)?
            }
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<string>"),
            message: e.to_string(),
        })
    }

    /// Apply `OLLAMA_HOST` / `OLLAMA_MODEL`
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides from a lookup function
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST).filter(|v| !v.trim().is_empty()) {
            debug!("Overriding ollama.host from {}", ENV_HOST);
            self.ollama.host = host;
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            debug!("Overriding ollama.model from {}", ENV_MODEL);
            self.ollama.model = model;
        }
    }

    /// Reject settings that would disable a safety valve
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ollama.host.trim().is_empty() {
            return Err(ConfigError::Invalid("ollama.host must not be empty".into()));
        }
        if self.ollama.model.trim().is_empty() {
            return Err(ConfigError::Invalid("ollama.model must not be empty".into()));
        }
        if self.tools.max_tools_per_request == 0 || self.tools.max_tools_per_request > 100 {
            return Err(ConfigError::Invalid(format!(
                "tools.max_tools_per_request ({}) must be between 1 and 100",
                self.tools.max_tools_per_request
            )));
        }
        if self.tools.tool_timeout_ms == 0 || self.tools.tool_timeout_ms > 600_000 {
            return Err(ConfigError::Invalid(format!(
                "tools.tool_timeout_ms ({}) must be between 1 and 600000",
                self.tools.tool_timeout_ms
            )));
        }
        self.safety
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("safety: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.tools.requires_approval(ToolCategory::Execution));
        assert!(!config.tools.requires_approval(ToolCategory::Search));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [ollama]
            model = "qwen2.5-coder:7b"

            [tools]
            require_approval_for_categories = ["execution", "filesystem"]
            skip_unapproved_tools = true

            [safety]
            max_turns = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.ollama.model, "qwen2.5-coder:7b");
        assert_eq!(config.ollama.host, "http://127.0.0.1:11434");
        assert_eq!(
            config.tools.require_approval_for_categories,
            vec![ToolCategory::Execution, ToolCategory::Filesystem]
        );
        assert!(config.tools.skip_unapproved_tools);
        assert_eq!(config.safety.max_turns, 4);
        assert_eq!(config.safety.max_consecutive_failures, 3);
    }

    #[test]
    fn test_unknown_category_rejected() {
        let err = AppConfig::from_toml_str("[tools]\nrequire_approval_for_categories = [\"network\"]")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            [(ENV_HOST, "http://gpu-box:11434"), (ENV_MODEL, "")].into();
        let mut config = AppConfig::default();
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.ollama.host, "http://gpu-box:11434");
        assert_eq!(config.ollama.model, "llama3.1:8b");
    }

    #[test]
    fn test_validate_rejects_zero_tool_limit() {
        let mut config = AppConfig::default();
        config.tools.max_tools_per_request = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_propagates_safety_errors() {
        let mut config = AppConfig::default();
        config.safety.max_turns = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("safety"));
    }

    #[test]
    fn test_load_explicit_missing_path() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            AppConfig::load(Some(&missing)),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_explicit_file_and_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut original = AppConfig::default();
        original.safety.max_turns = 7;
        fs::write(&path, original.to_toml_string().unwrap()).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.safety.max_turns, 7);
    }
}
