//! inproc_engine - Embedded engine lifecycle with resource-pool event hooks.
//!
//! This crate runs a small table engine inside the host process and lets a
//! caller block until a specific resource transition happens, such as a
//! table writer being returned to its pool once its rows are committed.
//!
//! # Features
//!
//! - **Lifecycle**: bootstrap a runtime root, start and stop the engine
//! - **Worker pools**: fixed-size named thread pools for queries, ingestion
//!   and deferred commits
//! - **Pool events**: every writer/reader transition reported to a single
//!   listener on the producing thread
//! - **Completion gate**: one-shot countdown used to wait for an event
//! - **Structured logging**: text or JSON lines via tracing
//!
//! # Example
//!
//! ```rust,ignore
//! use inproc_engine::config::ConfigBootstrapper;
//! use inproc_engine::engine::{EngineLifecycle, Statement};
//! use inproc_engine::protocol::create_and_wait;
//!
//! let layout = ConfigBootstrapper::new("engine_root").ensure()?;
//! let engine = EngineLifecycle::from_layout(layout)?;
//! engine.start()?;
//!
//! let client = engine.client()?;
//! let statement = Statement::create_table_as("trades", 1_000);
//! create_and_wait(&client, engine.dispatcher(), statement, None).await?;
//! ```

/// Package version from Cargo.toml
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit hash (8 chars) with optional "-dirty" suffix
pub const BUILD_VERSION: &str = env!("BUILD_VERSION");

/// Full version string: "0.1.0 (abc12345)" or "0.1.0 (abc12345-dirty)"
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_VERSION"), ")");

pub mod config;
pub mod engine;
pub mod events;
pub mod logging;
pub mod protocol;
pub mod sync;
pub mod time;

// Re-exports for convenience
pub use config::Config;
pub use engine::{EngineClient, EngineError, EngineLifecycle, EngineState, Statement};
pub use events::{EventDispatcher, LifecycleEvent, ListenerHandle};
pub use protocol::{create_and_wait, CompletionWatch, Condition, CreateOutcome};
pub use sync::CompletionGate;
