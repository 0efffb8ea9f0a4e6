//! Fixed-size worker pools backing the engine subsystems.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      ThreadPool                            │
//! ├────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐    ┌─────────┐    ┌─────────┐                 │
//! │  │ shared-0│    │ shared-1│    │ shared-2│  ...            │
//! │  └────┬────┘    └────┬────┘    └────┬────┘                 │
//! │       │              │              │                      │
//! │       └──────────────┴──────────────┘                      │
//! │                      │                                     │
//! │              ┌───────▼───────┐                             │
//! │              │  mpsc channel │  (bounded queue)            │
//! │              └───────┬───────┘                             │
//! │                      │                                     │
//! │       ┌──────────────┴──────────────┐                      │
//! │       │ execute() (async reply)     │                      │
//! │       │ submit()  (fire and forget) │                      │
//! │       └─────────────────────────────┘                      │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pools never grow or shrink after creation.

mod error;
mod thread;

pub use error::{PoolError, PoolResult};
pub use thread::ThreadPool;

/// Statistics about pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total requests dequeued by workers.
    pub total_requests: u64,
    /// Requests rejected due to full queue.
    pub rejected: u64,
    /// Requests whose handler panicked.
    pub panics: u64,
}
