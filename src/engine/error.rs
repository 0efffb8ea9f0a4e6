//! Engine error types.

use std::fmt;

use super::pool::PoolError;
use super::EngineState;
use crate::config::ConfigError;

/// Errors raised by the embedded engine.
#[derive(Debug)]
pub enum EngineError {
    /// Required directories or configuration are missing or unwritable.
    Startup { path: String, message: String },

    /// Configuration could not be loaded.
    Config(ConfigError),

    /// Operation not allowed in the current lifecycle state.
    InvalidState {
        state: EngineState,
        operation: &'static str,
    },

    /// A table with this name already exists.
    TableExists(String),

    /// No table with this name.
    TableNotFound(String),

    /// The table writer is handed out or locked.
    WriterBusy(String),

    /// Too many concurrent readers on the table.
    ReaderPoolFull(String),

    /// Worker pool failure.
    Pool(PoolError),
}

impl EngineError {
    /// True for errors that abort startup and should end the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Startup { .. } | EngineError::Config(_))
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Startup { path, message } => {
                write!(f, "startup failed for '{}': {}", path, message)
            }
            EngineError::Config(e) => write!(f, "configuration error: {}", e),
            EngineError::InvalidState { state, operation } => {
                write!(f, "cannot {} engine in state {:?}", operation, state)
            }
            EngineError::TableExists(name) => write!(f, "table already exists: {}", name),
            EngineError::TableNotFound(name) => write!(f, "table does not exist: {}", name),
            EngineError::WriterBusy(name) => write!(f, "table writer busy: {}", name),
            EngineError::ReaderPoolFull(name) => write!(f, "reader pool full: {}", name),
            EngineError::Pool(e) => write!(f, "worker pool error: {}", e),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Config(e) => Some(e),
            EngineError::Pool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        EngineError::Config(e)
    }
}

impl From<PoolError> for EngineError {
    fn from(e: PoolError) -> Self {
        EngineError::Pool(e)
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
