//! Environment variable and properties-file parsing utilities.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::ConfigError;

/// Prefix for environment variables overriding properties keys.
pub const ENV_PREFIX: &str = "ENGINE_";

/// Get environment variable with default value.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get optional environment variable (None if empty or missing).
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

/// Parse duration string (e.g., "30s", "2m", "1h", "1d", "1w", "250ms").
/// Returns None for "off" or "0".
pub fn parse_duration(s: &str) -> Result<Option<Duration>, String> {
    let s = s.trim().to_lowercase();

    if s == "off" || s == "0" || s.is_empty() {
        return Ok(None);
    }

    if let Some(num_str) = s.strip_suffix("ms") {
        let num: u64 = num_str
            .parse()
            .map_err(|_| format!("invalid number: {}", num_str))?;
        return Ok(Some(Duration::from_millis(num)));
    }

    let (num_str, unit) = match s.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&s[..idx], &s[idx..]),
        // Plain seconds
        _ => {
            return s
                .parse::<u64>()
                .map(|secs| Some(Duration::from_secs(secs)))
                .map_err(|_| format!("invalid duration: {}", s))
        }
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("invalid number: {}", num_str))?;

    let secs = match unit {
        "s" => num,
        "m" => num * 60,
        "h" => num * 3600,
        "d" => num * 86400,
        "w" => num * 86400 * 7,
        _ => return Err(format!("invalid unit: {}", unit)),
    };

    Ok(Some(Duration::from_secs(secs)))
}

/// Parse environment variable as duration.
pub fn env_duration(key: &str, default: &str) -> Result<Option<Duration>, ConfigError> {
    let value = env_or(key, default);
    parse_duration(&value).map_err(|e| ConfigError::Parse {
        key: key.into(),
        value,
        error: e,
    })
}

/// Flat `key=value` set read from a configuration file.
///
/// Blank lines and lines starting with `#` are skipped; later duplicates
/// win. Keys are looked up verbatim, so unknown keys are simply never read.
#[derive(Clone, Debug, Default)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    /// Parse properties text.
    pub fn parse(text: &str) -> Self {
        let values = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Self { values }
    }

    /// Read and parse a properties file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.display().to_string(),
            error,
        })?;
        Ok(Self::parse(&text))
    }

    /// Apply `ENGINE_*` environment overrides.
    ///
    /// `ENGINE_SHARED_WORKER_COUNT=4` overrides `shared.worker.count`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(std::env::vars())
    }

    /// Apply overrides from an iterator of environment-style pairs.
    pub fn with_overrides<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            if let Some(rest) = name.strip_prefix(ENV_PREFIX) {
                if value.is_empty() {
                    continue;
                }
                let key = rest.to_lowercase().replace('_', ".");
                self.values.insert(key, value);
            }
        }
        self
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Parse `key` with type conversion, falling back to `default`.
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(v) => v.parse().map_err(|e: T::Err| ConfigError::Parse {
                key: key.into(),
                value: v.into(),
                error: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    /// Parse a boolean flag: `true`/`false`/`1`/`0` (case-insensitive).
    pub fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            Some(v) => match v.to_lowercase().as_str() {
                "1" | "true" => Ok(true),
                "0" | "false" => Ok(false),
                _ => Err(ConfigError::Parse {
                    key: key.into(),
                    value: v.into(),
                    error: "expected true or false".into(),
                }),
            },
            None => Ok(default),
        }
    }

    /// Parse a strictly positive count.
    pub fn positive(&self, key: &str, default: usize) -> Result<NonZeroUsize, ConfigError> {
        let count: usize = self.parse_or(key, default)?;
        NonZeroUsize::new(count).ok_or_else(|| ConfigError::Invalid {
            key: key.into(),
            message: "must be a positive integer".into(),
        })
    }

    /// Parse a millisecond value into a `Duration`.
    pub fn millis(&self, key: &str, default_ms: u64) -> Result<Duration, ConfigError> {
        self.parse_or(key, default_ms).map(Duration::from_millis)
    }
}
