//! Configuration error types.

use std::fmt;

/// Error type for configuration loading and bootstrapping.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to parse a configuration value.
    Parse {
        key: String,
        value: String,
        error: String,
    },
    /// Value parsed but is out of range or inconsistent.
    Invalid { key: String, message: String },
    /// IO error (e.g., creating the root directory or writing server.conf).
    Io { path: String, error: std::io::Error },
}

impl ConfigError {
    pub(crate) fn io(path: &std::path::Path, error: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.display().to_string(),
            error,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse { key, value, error } => {
                write!(f, "failed to parse {}='{}': {}", key, value, error)
            }
            ConfigError::Invalid { key, message } => {
                write!(f, "invalid value for {}: {}", key, message)
            }
            ConfigError::Io { path, error } => {
                write!(f, "IO error for '{}': {}", path, error)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display() {
        let err = ConfigError::Invalid {
            key: "o3.min.lag".into(),
            message: "must not exceed o3.max.lag".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for o3.min.lag: must not exceed o3.max.lag"
        );

        let err = ConfigError::io(
            std::path::Path::new("/nope/conf"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/nope/conf"));
        assert!(err.source().is_some());
    }
}
