//! Logging configuration.

use std::path::{Path, PathBuf};

use super::parse::{env_or, Properties};
use super::ConfigError;

const DEFAULT_FILTER: &str = "inproc_engine=info";

/// Output line format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text lines.
    #[default]
    Text,
    /// Unified JSON lines.
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Logging configuration loaded from environment and `conf/log.conf`.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Log level filter (from LOG_LEVEL, RUST_LOG, or log.conf).
    pub filter: String,
    /// Service name for structured logging.
    pub service_name: String,
    pub format: LogFormat,
    /// Write to stdout.
    pub stdout: bool,
    /// Also append to this file.
    pub file: Option<PathBuf>,
    filter_from_env: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            service_name: "inproc_engine".to_string(),
            format: LogFormat::Text,
            stdout: true,
            file: None,
            filter_from_env: false,
        }
    }
}

impl LoggingConfig {
    /// Load configuration from environment variables.
    ///
    /// Priority: LOG_LEVEL > RUST_LOG > default
    ///
    /// LOG_LEVEL accepts simple values: trace, debug, info, warn, error
    /// RUST_LOG accepts full tracing filter syntax: inproc_engine=debug
    pub fn from_env() -> Result<Self, ConfigError> {
        let filter = Self::resolve_log_filter();
        Ok(Self {
            filter_from_env: filter.is_some(),
            filter: filter.unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            service_name: env_or("SERVICE_NAME", "inproc_engine"),
            format: LogFormat::parse(&env_or("LOG_FORMAT", "text")),
            stdout: true,
            file: None,
        })
    }

    /// Merge settings from `log.conf`. Relative file locations resolve
    /// against `root`. An explicit env filter is kept.
    ///
    /// Recognised keys: `writers` (comma list of `stdout`, `file`), `level`,
    /// `format`, `file.location`.
    pub fn merge_log_conf(mut self, props: &Properties, root: &Path) -> Self {
        if let Some(writers) = props.get("writers") {
            let writers: Vec<_> = writers.split(',').map(str::trim).collect();
            self.stdout = writers.contains(&"stdout");
            self.file = writers.contains(&"file").then(|| {
                let location = props
                    .get("file.location")
                    .unwrap_or("inproc_engine.log");
                root.join(location)
            });
        }

        if !self.filter_from_env {
            if let Some(level) = props.get("level").and_then(normalize_level) {
                self.filter = format!("inproc_engine={}", level);
            }
        }

        if let Some(format) = props.get("format") {
            self.format = LogFormat::parse(format);
        }

        self
    }

    /// Resolve log filter from environment.
    ///
    /// Priority: LOG_LEVEL > RUST_LOG
    fn resolve_log_filter() -> Option<String> {
        // 1. Check LOG_LEVEL first (simple: debug, info, warn, error)
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            match normalize_level(&level) {
                Some(level) => return Some(format!("inproc_engine={}", level)),
                None => {
                    // Subscriber isn't installed yet
                    eprintln!(
                        "Warning: Invalid LOG_LEVEL '{}', expected: trace, debug, info, warn, error",
                        level
                    );
                }
            }
        }

        // 2. Check RUST_LOG (full tracing filter syntax)
        std::env::var("RUST_LOG").ok().filter(|f| !f.is_empty())
    }
}

fn normalize_level(level: &str) -> Option<String> {
    let level = level.trim().to_lowercase();
    matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error").then_some(level)
}
