//! Safety configuration for the tool loop
//!
//! Defines the limits that keep a conversation from running away:
//! - Runaway conversations (max turns, consecutive-failure breaker)
//! - Blind retries (dedup window, per-signature failure warnings)
//! - Memory growth (result cache capacity and TTL)
//! - Garbage content (bounded streaming parse attempts)

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for safety limits
///
/// All limits are failsafe: when one is hit the loop stops or the call is
/// refused with a clear message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Maximum model turns per request
    pub max_turns: usize,

    /// Consecutive failed tool calls that end the conversation
    pub max_consecutive_failures: usize,

    /// Window in which an identical call is refused (milliseconds)
    pub tool_call_dedup_ttl_ms: u64,

    /// Lifetime of cached tool results (milliseconds)
    pub tool_result_ttl_ms: u64,

    /// Capacity of the tool result cache
    pub max_tool_results: usize,

    /// Failed embedded-JSON parse attempts allowed per turn
    pub max_streaming_parse_attempts: usize,

    /// Failures of the same call signature before an escalating warning
    pub failure_warning_threshold: usize,

    /// Time to wait for an approval answer (milliseconds); silence denies
    pub approval_timeout_ms: u64,

    /// Maximum characters of tool output fed back to the model
    pub output_truncate_chars: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_consecutive_failures: 3,
            tool_call_dedup_ttl_ms: 60_000, // 1 minute
            tool_result_ttl_ms: 300_000,    // 5 minutes
            max_tool_results: 100,
            max_streaming_parse_attempts: 10,
            failure_warning_threshold: 2,
            approval_timeout_ms: 60_000, // 1 minute
            output_truncate_chars: 10_000,
        }
    }
}

impl SafetyConfig {
    /// Permissive configuration for tests
    pub fn permissive() -> Self {
        Self {
            max_turns: 100,
            max_consecutive_failures: 100,
            tool_call_dedup_ttl_ms: 1,
            tool_result_ttl_ms: 3_600_000, // 1 hour
            max_tool_results: 10_000,
            max_streaming_parse_attempts: 1_000,
            failure_warning_threshold: 100,
            approval_timeout_ms: 300_000, // 5 minutes
            output_truncate_chars: 1_000_000,
        }
    }

    /// Restrictive configuration for safety-critical contexts
    pub fn restrictive() -> Self {
        Self {
            max_turns: 5,
            max_consecutive_failures: 2,
            tool_call_dedup_ttl_ms: 300_000, // 5 minutes
            tool_result_ttl_ms: 120_000,     // 2 minutes
            max_tool_results: 50,
            max_streaming_parse_attempts: 5,
            failure_warning_threshold: 2,
            approval_timeout_ms: 30_000, // 30 seconds
            output_truncate_chars: 5_000,
        }
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_millis(self.tool_call_dedup_ttl_ms)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_millis(self.tool_result_ttl_ms)
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_millis(self.approval_timeout_ms)
    }

    /// Validate that configuration values are sensible
    ///
    /// Returns Err if any value is out of acceptable range.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_turns == 0 || self.max_turns > 1_000 {
            return Err(format!(
                "max_turns ({}) must be between 1 and 1000",
                self.max_turns
            ));
        }
        if self.max_consecutive_failures == 0 {
            return Err("max_consecutive_failures must be > 0".to_string());
        }
        if self.max_tool_results == 0 {
            return Err("max_tool_results must be > 0".to_string());
        }
        if self.tool_result_ttl_ms == 0 {
            return Err("tool_result_ttl_ms must be > 0".to_string());
        }
        if self.max_streaming_parse_attempts == 0 {
            return Err("max_streaming_parse_attempts must be > 0".to_string());
        }
        if self.approval_timeout_ms == 0 {
            return Err("approval_timeout_ms must be > 0".to_string());
        }
        if self.output_truncate_chars < 100 {
            return Err(format!(
                "output_truncate_chars ({}) is too small (minimum 100)",
                self.output_truncate_chars
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SafetyConfig::default();
        assert_eq!(config.max_turns, 10);
        assert_eq!(config.max_consecutive_failures, 3);
        assert_eq!(config.dedup_ttl(), Duration::from_secs(60));
        assert_eq!(config.max_tool_results, 100);
        assert_eq!(config.approval_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_presets_validate() {
        assert!(SafetyConfig::default().validate().is_ok());
        assert!(SafetyConfig::permissive().validate().is_ok());
        assert!(SafetyConfig::restrictive().validate().is_ok());
    }

    #[test]
    fn test_restrictive_is_tighter() {
        let strict = SafetyConfig::restrictive();
        let default = SafetyConfig::default();
        assert!(strict.max_turns < default.max_turns);
        assert!(strict.max_consecutive_failures < default.max_consecutive_failures);
    }

    #[test]
    fn test_validate_zero_turns() {
        let config = SafetyConfig {
            max_turns: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_cache_capacity() {
        let config = SafetyConfig {
            max_tool_results: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_too_small_truncation() {
        let config = SafetyConfig {
            output_truncate_chars: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SafetyConfig = toml::from_str("max_turns = 4").unwrap();
        assert_eq!(config.max_turns, 4);
        assert_eq!(config.max_tool_results, 100);
    }
}
