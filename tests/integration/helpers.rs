//! Test helpers and utilities

use std::sync::{Arc, Mutex};
use std::time::Duration;

use inproc_engine::config::{ConfigBootstrapper, RuntimeConfig, RuntimeLayout};
use inproc_engine::events::{EventKind, LifecycleEvent, ResourceCategory};
use inproc_engine::EngineLifecycle;
use tempfile::TempDir;

/// Engine rooted in a temporary directory, removed on drop.
pub struct TestEngine {
    pub engine: EngineLifecycle,
    pub layout: RuntimeLayout,
    // Dropped after the engine
    _dir: TempDir,
}

#[allow(dead_code)]
impl TestEngine {
    /// Bootstrapped root with a short commit lag.
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let layout = ConfigBootstrapper::new(dir.path().join("engine_root"))
            .ensure()
            .expect("Failed to bootstrap engine root");
        let engine = EngineLifecycle::new(layout.clone(), config);
        Self {
            engine,
            layout,
            _dir: dir,
        }
    }

    /// Same as `new()` but already started.
    pub fn started() -> Self {
        let test = Self::new();
        test.engine.start().expect("Failed to start engine");
        test
    }
}

/// Defaults with a 50ms commit lag and WAL off.
pub fn fast_config() -> RuntimeConfig {
    RuntimeConfig {
        o3_min_lag: Duration::from_millis(50),
        o3_max_lag: Duration::from_secs(5),
        wal_enabled_default: false,
        ..RuntimeConfig::default()
    }
}

/// Event log shared with a listener.
pub type Recorded = Arc<Mutex<Vec<(ResourceCategory, EventKind, Option<String>)>>>;

/// Listener that records every event.
#[allow(dead_code)]
pub fn recorder() -> (Recorded, impl Fn(&LifecycleEvent) + Send + Sync + 'static) {
    let seen: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener = move |e: &LifecycleEvent| {
        sink.lock()
            .unwrap()
            .push((e.category(), e.kind(), e.resource().map(str::to_owned)));
    };
    (seen, listener)
}

/// Count recorded events matching category, kind and table.
#[allow(dead_code)]
pub fn count(seen: &Recorded, category: ResourceCategory, kind: EventKind, table: &str) -> usize {
    seen.lock()
        .unwrap()
        .iter()
        .filter(|(c, k, r)| *c == category && *k == kind && r.as_deref() == Some(table))
        .count()
}
