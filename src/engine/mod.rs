//! Embedded engine: lifecycle, worker pools and the statement client.
//!
//! # Architecture
//!
//! ```text
//!   caller (tokio)                engine threads
//!   ──────────────                ──────────────
//!   LocalClient::execute ──────▶  query-N   ── CreateTableAs / Select / Drop
//!                        ──────▶  ingest-N  ── Insert
//!                                    │
//!                                    └─ ApplyJob ──▶ shared-N ── commit
//!
//!   every pool transition ──▶ EventDispatcher ──▶ listener (on that thread)
//! ```
//!
//! The engine is `Created` until [`EngineLifecycle::start`] spawns the
//! pools, and `Stopped` for good after [`EngineLifecycle::stop`].

mod catalog;
mod client;
mod error;
mod executor;
pub mod pool;
mod resource;
mod statement;

use std::fmt;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use catalog::{Symbol, Trade, TradeGenerator, TRADES_EPOCH_MICROS, TRADES_STEP_MICROS};
pub use client::{ClientError, EngineClient, LocalClient};
pub use error::{EngineError, Result};
pub use executor::{ApplyJob, EngineStats, StatementExecutor};
pub use resource::{ReaderPool, TableReader, TableWriter, WriterLock, WriterPool, DEFAULT_MAX_READERS};
pub use statement::{Query, Reply, Statement};

use crate::config::{Config, ConfigError, RuntimeConfig, RuntimeLayout};
use crate::events::{EventDispatcher, LifecycleEvent, ListenerHandle};
use pool::ThreadPool;

/// Engine lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Started,
    /// Terminal.
    Stopped,
}

/// Worker pools of a started engine.
pub(crate) struct Pools {
    pub(crate) query: ThreadPool<Statement, Result<Reply>>,
    pub(crate) ingest: ThreadPool<Statement, Result<Reply>>,
    pub(crate) shared: Arc<ThreadPool<ApplyJob, ()>>,
}

impl Pools {
    fn spawn(config: &RuntimeConfig, executor: &Arc<StatementExecutor>) -> std::io::Result<Self> {
        let shared = {
            let executor = Arc::clone(executor);
            Arc::new(ThreadPool::with_capacity(
                config.shared_workers.get(),
                config.queue_capacity_for(config.shared_workers),
                "shared",
                move |job: ApplyJob| executor.apply(job),
            )?)
        };

        let statement_pool = |name: &str, workers: NonZeroUsize| {
            let executor = Arc::clone(executor);
            let apply = Arc::clone(&shared);
            ThreadPool::with_capacity(
                workers.get(),
                config.queue_capacity_for(workers),
                name,
                move |statement: Statement| executor.execute(statement, &apply),
            )
        };

        let query = statement_pool("query", config.query_workers)?;
        let ingest = statement_pool("ingest", config.ingest_workers)?;

        Ok(Self {
            query,
            ingest,
            shared,
        })
    }

    /// Stop intake, then drain statement pools before the apply pool so
    /// already scheduled commits still run.
    fn shutdown(&self) {
        for pool in [&self.query, &self.ingest] {
            pool.shutdown();
            pool.join();
        }
        self.shared.shutdown();
        self.shared.join();
    }
}

struct Running {
    executor: Arc<StatementExecutor>,
    pools: Arc<Pools>,
}

struct LifecycleInner {
    state: EngineState,
    running: Option<Running>,
}

/// Owns the embedded engine.
///
/// ```rust,ignore
/// let engine = EngineLifecycle::from_layout(layout)?;
/// let _handle = engine.install_listener(|event| println!("{}", event));
/// engine.start()?;
/// let reply = engine.client()?.execute(Statement::create_table_as("trades", 10)).await?;
/// engine.stop();
/// ```
pub struct EngineLifecycle {
    layout: RuntimeLayout,
    config: RuntimeConfig,
    dispatcher: EventDispatcher,
    inner: Mutex<LifecycleInner>,
}

impl EngineLifecycle {
    pub fn new(layout: RuntimeLayout, config: RuntimeConfig) -> Self {
        Self {
            layout,
            config,
            dispatcher: EventDispatcher::new(),
            inner: Mutex::new(LifecycleInner {
                state: EngineState::Created,
                running: None,
            }),
        }
    }

    /// Load `server.conf` from a bootstrapped layout.
    pub fn from_layout(layout: RuntimeLayout) -> std::result::Result<Self, ConfigError> {
        let config = RuntimeConfig::load(&layout.server_conf)?;
        Ok(Self::new(layout, config))
    }

    /// Build from an already loaded [`Config`].
    pub fn with_config(layout: RuntimeLayout, config: &Config) -> Self {
        Self::new(layout, config.runtime.clone())
    }

    /// Spawn the worker pools. Only valid once, from `Created`.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock_inner();
        if inner.state != EngineState::Created {
            return Err(EngineError::InvalidState {
                state: inner.state,
                operation: "start",
            });
        }

        self.check_layout()?;

        let executor = Arc::new(StatementExecutor::new(
            self.config.clone(),
            self.dispatcher.clone(),
        ));
        let pools = Pools::spawn(&self.config, &executor).map_err(|e| EngineError::Startup {
            path: self.layout.root.display().to_string(),
            message: format!("cannot spawn worker threads: {}", e),
        })?;

        inner.running = Some(Running {
            executor,
            pools: Arc::new(pools),
        });
        inner.state = EngineState::Started;

        tracing::info!(
            root = %self.layout.root.display(),
            shared = self.config.shared_workers.get(),
            query = self.config.query_workers.get(),
            ingest = self.config.ingest_workers.get(),
            "engine started"
        );
        if self.config.telemetry_enabled {
            tracing::info!(
                target: "inproc_engine::telemetry",
                event = "engine_start",
                version = crate::VERSION,
                wal_default = self.config.wal_enabled_default,
            );
        }
        Ok(())
    }

    /// Stop the engine. Idempotent; `Stopped` is terminal.
    pub fn stop(&self) {
        let running = {
            let mut inner = self.lock_inner();
            match inner.state {
                EngineState::Stopped => return,
                EngineState::Created => {
                    inner.state = EngineState::Stopped;
                    tracing::debug!("engine stopped before start");
                    return;
                }
                EngineState::Started => {
                    inner.state = EngineState::Stopped;
                    inner.running.take()
                }
            }
        };

        // Joining happens outside the state lock so workers can still
        // query state() while draining
        if let Some(running) = running {
            running.pools.shutdown();
            running.executor.close();
            if let Some(stats) = running.executor.stats() {
                tracing::info!(
                    statements = stats.statements,
                    failed = stats.failed_statements,
                    apply_jobs = stats.apply_jobs,
                    rows = stats.rows_committed,
                    "engine stopped"
                );
            } else {
                tracing::info!("engine stopped");
            }
        }
    }

    pub fn state(&self) -> EngineState {
        self.lock_inner().state
    }

    /// Install the single lifecycle listener. See
    /// [`EventDispatcher::set_listener`] for the threading contract.
    pub fn install_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.dispatcher.set_listener(listener)
    }

    /// Dispatcher shared with the engine's pools.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Client bound to the running engine's pools.
    pub fn client(&self) -> Result<LocalClient> {
        let inner = self.lock_inner();
        match inner.running {
            Some(ref running) => Ok(LocalClient::new(Arc::clone(&running.pools))),
            None => Err(EngineError::InvalidState {
                state: inner.state,
                operation: "connect to",
            }),
        }
    }

    /// Counter snapshot while started with metrics enabled.
    pub fn stats(&self) -> Option<EngineStats> {
        self.lock_inner()
            .running
            .as_ref()
            .and_then(|running| running.executor.stats())
    }

    pub fn layout(&self) -> &RuntimeLayout {
        &self.layout
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn check_layout(&self) -> Result<()> {
        for dir in [&self.layout.root, &self.layout.conf_dir, &self.layout.db_dir] {
            if !dir.is_dir() {
                return Err(startup_error(dir, "directory does not exist"));
            }
        }
        if !self.layout.server_conf.is_file() {
            return Err(startup_error(&self.layout.server_conf, "configuration file missing"));
        }
        if !is_writable(&self.layout.db_dir) {
            return Err(startup_error(&self.layout.db_dir, "directory is not writable"));
        }
        Ok(())
    }

    fn lock_inner(&self) -> MutexGuard<'_, LifecycleInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EngineLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineLifecycle")
            .field("root", &self.layout.root)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for EngineLifecycle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn startup_error(path: &Path, message: &str) -> EngineError {
    EngineError::Startup {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBootstrapper;
    use std::time::Duration;

    fn engine() -> (tempfile::TempDir, EngineLifecycle) {
        let dir = tempfile::tempdir().unwrap();
        let layout = ConfigBootstrapper::new(dir.path().join("root")).ensure().unwrap();
        let config = RuntimeConfig {
            o3_min_lag: Duration::from_millis(10),
            ..RuntimeConfig::default()
        };
        (dir, EngineLifecycle::new(layout, config))
    }

    #[test]
    fn test_state_machine() {
        let (_dir, engine) = engine();
        assert_eq!(engine.state(), EngineState::Created);
        assert!(engine.client().is_err());

        engine.start().unwrap();
        assert_eq!(engine.state(), EngineState::Started);
        assert!(matches!(
            engine.start(),
            Err(EngineError::InvalidState {
                state: EngineState::Started,
                ..
            })
        ));

        engine.stop();
        assert_eq!(engine.state(), EngineState::Stopped);
        engine.stop();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(engine.start().is_err());
    }

    #[test]
    fn test_stop_before_start() {
        let (_dir, engine) = engine();
        engine.stop();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(engine.start().is_err());
    }

    #[test]
    fn test_start_requires_layout() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RuntimeLayout::new(dir.path().join("missing"));
        let engine = EngineLifecycle::new(layout, RuntimeConfig::default());

        let err = engine.start().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(engine.state(), EngineState::Created);
    }

    #[test]
    fn test_client_after_stop_is_unavailable() {
        let (_dir, engine) = engine();
        engine.start().unwrap();
        let client = engine.client().unwrap();
        engine.stop();

        let err = tokio_test::block_on(client.execute(Statement::create_table_as("t", 1)))
            .unwrap_err();
        assert!(matches!(err, ClientError::Unavailable(_)));
    }

    #[test]
    fn test_listener_sees_pool_threads() {
        let (_dir, engine) = engine();
        let threads = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&threads);
        let _handle = engine.install_listener(move |e| {
            sink.lock().unwrap().push(e.thread_name().unwrap_or("").to_string());
        });
        engine.start().unwrap();

        let client = engine.client().unwrap();
        tokio_test::block_on(client.execute(Statement::create_table_as("trades", 5))).unwrap();
        engine.stop();

        let threads = threads.lock().unwrap();
        assert!(threads.iter().any(|t| t.starts_with("query-")));
        assert!(threads.iter().any(|t| t.starts_with("shared-")));
        assert_eq!(engine.stats(), None);
    }
}
