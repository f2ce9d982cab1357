//! Tracing setup
//!
//! Diagnostics go to stderr so they never interleave with streamed model
//! output on stdout. When `logging.directory` is set, a daily-rolling JSON
//! log is written there as well.

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Environment variable that overrides the configured filter
pub const ENV_LOG: &str = "OLLAMA_CODE_LOG";

const LOG_FILE_PREFIX: &str = "ollama-code.log";

/// Filter directive from the environment, the debug flag, or the config
pub fn filter_directive(config: &LoggingConfig, debug: bool) -> String {
    filter_directive_from(config, debug, |key| std::env::var(key).ok())
}

fn filter_directive_from<F>(config: &LoggingConfig, debug: bool, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    [ENV_LOG, "RUST_LOG"]
        .iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| {
            if debug {
                "debug".to_string()
            } else {
                config.level.clone()
            }
        })
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer; keep it alive for the
/// lifetime of the process.
pub fn init_logging(config: &LoggingConfig, debug: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let directive = filter_directive(config, debug);
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter '{}'", directive))?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .boxed();

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory).with_context(|| {
                format!("Failed to create log directory {}", directory.display())
            })?;
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_level_used_without_env() {
        let config = LoggingConfig::default();
        assert_eq!(filter_directive_from(&config, false, |_| None), config.level);
    }

    #[test]
    fn test_debug_flag_raises_level() {
        let config = LoggingConfig::default();
        assert_eq!(filter_directive_from(&config, true, |_| None), "debug");
    }

    #[test]
    fn test_env_wins_over_debug_flag() {
        let config = LoggingConfig::default();
        let directive = filter_directive_from(&config, true, |key| {
            (key == ENV_LOG).then(|| "ollama_code=trace".to_string())
        });
        assert_eq!(directive, "ollama_code=trace");
    }

    #[test]
    fn test_blank_env_ignored() {
        let config = LoggingConfig::default();
        let directive = filter_directive_from(&config, false, |key| match key {
            ENV_LOG => Some("  ".to_string()),
            "RUST_LOG" => Some("info".to_string()),
            _ => None,
        });
        assert_eq!(directive, "info");
    }
}
