//! Worker pool error types.

use std::fmt;
use std::time::Duration;

/// Errors that can occur during pool operations.
#[derive(Debug, Clone)]
pub enum PoolError {
    /// The request queue is full.
    QueueFull {
        /// Maximum queue capacity.
        capacity: usize,
        /// Current number of pending requests.
        pending: usize,
    },

    /// The request timed out.
    Timeout(Duration),

    /// The handler panicked while processing the request.
    WorkerPanic(String),

    /// The pool has been shut down.
    Shutdown,

    /// The response channel was closed unexpectedly.
    ChannelClosed,
}

impl PoolError {
    /// Check if this is a queue full error.
    pub fn is_queue_full(&self) -> bool {
        matches!(self, PoolError::QueueFull { .. })
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::Timeout(_))
    }

    /// Check if this is a shutdown error.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, PoolError::Shutdown)
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::QueueFull { capacity, pending } => {
                write!(
                    f,
                    "queue full: {}/{} pending requests",
                    pending, capacity
                )
            }
            PoolError::Timeout(duration) => {
                write!(f, "request timeout after {}ms", duration.as_millis())
            }
            PoolError::WorkerPanic(msg) => {
                write!(f, "worker panic: {}", msg)
            }
            PoolError::Shutdown => {
                write!(f, "pool has been shut down")
            }
            PoolError::ChannelClosed => {
                write!(f, "response channel closed unexpectedly")
            }
        }
    }
}

impl std::error::Error for PoolError {}

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
