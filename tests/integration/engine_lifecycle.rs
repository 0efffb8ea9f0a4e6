//! Engine lifecycle: bootstrap, start, stop, startup failures.

use std::time::Duration;

use inproc_engine::config::ConfigBootstrapper;
use inproc_engine::engine::{ClientError, EngineClient, EngineError, Statement};
use inproc_engine::{EngineLifecycle, EngineState};

use crate::helpers::*;

#[test]
fn test_start_stop_is_idempotent() {
    let test = TestEngine::new();
    let engine = &test.engine;

    assert_eq!(engine.state(), EngineState::Created);
    engine.start().unwrap();
    assert_eq!(engine.state(), EngineState::Started);

    engine.stop();
    engine.stop();
    assert_eq!(engine.state(), EngineState::Stopped);

    let err = engine.start().unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState {
            state: EngineState::Stopped,
            ..
        }
    ));
}

#[test]
fn test_generated_config_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ConfigBootstrapper::new(dir.path().join("root")).ensure().unwrap();
    assert!(layout.created);

    let engine = EngineLifecycle::from_layout(layout).unwrap();
    let config = engine.config();
    assert_eq!(config.shared_workers.get(), 2);
    assert_eq!(config.query_workers.get(), 1);
    assert_eq!(config.o3_min_lag, Duration::from_millis(2000));
    assert_eq!(config.o3_max_lag, Duration::from_millis(10000));
    assert!(!config.metrics_enabled);
    assert!(!config.wal_enabled_default);

    engine.start().unwrap();
    assert!(engine.stats().is_none());
}

#[test]
fn test_second_bootstrap_keeps_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");
    let first = ConfigBootstrapper::new(&root).ensure().unwrap();
    std::fs::write(&first.server_conf, "shared.worker.count=3\n").unwrap();

    let second = ConfigBootstrapper::new(&root).ensure().unwrap();
    assert!(!second.created);

    let engine = EngineLifecycle::from_layout(second).unwrap();
    assert_eq!(engine.config().shared_workers.get(), 3);
}

#[test]
fn test_zero_workers_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ConfigBootstrapper::new(dir.path().join("root")).ensure().unwrap();
    std::fs::write(&layout.server_conf, "shared.worker.count=0\n").unwrap();

    let err = EngineLifecycle::from_layout(layout).unwrap_err();
    assert!(err.to_string().contains("shared.worker.count"));
}

#[test]
fn test_missing_db_dir_is_fatal() {
    let test = TestEngine::new();
    std::fs::remove_dir(&test.layout.db_dir).unwrap();

    let err = test.engine.start().unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("db"));
    assert_eq!(test.engine.state(), EngineState::Created);
}

#[test]
fn test_missing_server_conf_is_fatal() {
    let test = TestEngine::new();
    std::fs::remove_file(&test.layout.server_conf).unwrap();

    assert!(test.engine.start().unwrap_err().is_fatal());
}

#[cfg(unix)]
#[test]
fn test_read_only_db_dir_is_fatal() {
    use std::os::unix::fs::PermissionsExt;

    // Root ignores permission bits
    if unsafe { libc::geteuid() } == 0 {
        return;
    }

    let test = TestEngine::new();
    std::fs::set_permissions(&test.layout.db_dir, std::fs::Permissions::from_mode(0o555)).unwrap();

    let err = test.engine.start().unwrap_err();
    assert!(matches!(err, EngineError::Startup { .. }));

    std::fs::set_permissions(&test.layout.db_dir, std::fs::Permissions::from_mode(0o775)).unwrap();
}

#[tokio::test]
async fn test_drop_stops_engine() {
    let test = TestEngine::started();
    let client = test.engine.client().unwrap();
    drop(test);

    let err = client
        .execute(Statement::create_table_as("trades", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Unavailable(_)));
}
