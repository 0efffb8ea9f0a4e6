//! Waiting for a table's rows to become visible.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use inproc_engine::config::RuntimeConfig;
use inproc_engine::engine::{EngineClient, Query, Reply, Statement};
use inproc_engine::events::{EventKind, LifecycleEvent, ResourceCategory};
use inproc_engine::protocol::{
    create_and_wait, CompletionWatch, Condition, CreateOutcome, ProtocolError,
};

use crate::helpers::*;

async fn row_count(client: &impl EngineClient, table: &str) -> usize {
    match client
        .execute(Statement::Select(Query::table(table)))
        .await
        .unwrap()
    {
        Reply::Rows(rows) => rows.len(),
        other => panic!("unexpected reply: {:?}", other),
    }
}

/// Rows are invisible when the create is acknowledged and visible once the
/// writer release has been observed.
#[tokio::test]
async fn test_rows_visible_after_release() {
    let test = TestEngine::with_config(RuntimeConfig {
        o3_min_lag: Duration::from_millis(300),
        ..fast_config()
    });
    test.engine.start().unwrap();
    let client = test.engine.client().unwrap();

    let reply = client
        .execute(Statement::create_table_as("early", 100))
        .await
        .unwrap();
    assert!(matches!(reply, Reply::Created { .. }));
    assert_eq!(row_count(&client, "early").await, 0);

    let outcome = create_and_wait(
        &client,
        test.engine.dispatcher(),
        Statement::create_table_as("trades", 1_000),
        Some(Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert_eq!(outcome, CreateOutcome::Created);
    assert_eq!(row_count(&client, "trades").await, 1_000);
    assert!(!test.engine.dispatcher().has_listener());
}

/// Rows queued for a dropped table neither reach a table recreated under the
/// same name nor open the gate waiting on it.
#[tokio::test]
async fn test_recreated_table_ignores_stale_rows() {
    let test = TestEngine::with_config(RuntimeConfig {
        o3_min_lag: Duration::from_millis(300),
        ..fast_config()
    });
    test.engine.start().unwrap();
    let client = test.engine.client().unwrap();

    client
        .execute(Statement::create_table_as("trades", 5))
        .await
        .unwrap();
    let reply = client
        .execute(Statement::Drop {
            table: "trades".into(),
        })
        .await
        .unwrap();
    assert_eq!(reply, Reply::Dropped);

    let outcome = create_and_wait(
        &client,
        test.engine.dispatcher(),
        Statement::create_table_as("trades", 1_000),
        Some(Duration::from_secs(10)),
    )
    .await
    .unwrap();
    assert_eq!(outcome, CreateOutcome::Created);
    assert_eq!(row_count(&client, "trades").await, 1_000);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(row_count(&client, "trades").await, 1_000);
}

#[tokio::test]
async fn test_wal_table() {
    let test = TestEngine::with_config(RuntimeConfig {
        wal_enabled_default: true,
        ..fast_config()
    });
    test.engine.start().unwrap();
    let client = test.engine.client().unwrap();

    create_and_wait(
        &client,
        test.engine.dispatcher(),
        Statement::create_table_as("trades", 500),
        Some(Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert_eq!(row_count(&client, "trades").await, 500);
}

/// A second create of the same table returns at once without any event.
#[tokio::test]
async fn test_duplicate_create_returns_immediately() {
    let test = TestEngine::started();
    let client = test.engine.client().unwrap();
    let dispatcher = test.engine.dispatcher();

    create_and_wait(
        &client,
        dispatcher,
        Statement::create_table_as("trades", 10),
        Some(Duration::from_secs(10)),
    )
    .await
    .unwrap();

    let before = dispatcher.dispatched();
    let started = Instant::now();
    let outcome = create_and_wait(
        &client,
        dispatcher,
        Statement::create_table_as("trades", 10),
        Some(Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert_eq!(outcome, CreateOutcome::AlreadyExists);
    assert_eq!(dispatcher.dispatched(), before);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(row_count(&client, "trades").await, 10);
}

/// `(trades, Acquire)`, `(other, Release)`, `(trades, Release)` from a
/// worker thread: the gate opens after the third event and not before.
#[test]
fn test_gate_opens_on_third_event() {
    let test = TestEngine::new();
    let dispatcher = test.engine.dispatcher().clone();
    let watch = CompletionWatch::watch(&dispatcher, Condition::writer_released("trades")).unwrap();
    let gate = Arc::clone(watch.gate());

    let (step_tx, step_rx) = std::sync::mpsc::channel::<()>();
    let (done_tx, done_rx) = std::sync::mpsc::channel::<bool>();

    let worker = thread::Builder::new()
        .name("shared-0".into())
        .spawn(move || {
            let events = [
                (EventKind::Acquire, "trades"),
                (EventKind::Release, "other"),
                (EventKind::Release, "trades"),
            ];
            for (kind, table) in events {
                step_rx.recv().unwrap();
                let event = LifecycleEvent::new(ResourceCategory::Writer, kind, Some(Arc::from(table)));
                dispatcher.dispatch(&event);
                done_tx.send(gate.is_released()).unwrap();
            }
        })
        .unwrap();

    let mut released = Vec::new();
    for _ in 0..3 {
        step_tx.send(()).unwrap();
        released.push(done_rx.recv().unwrap());
    }
    assert_eq!(released, vec![false, false, true]);

    watch
        .await_completion(CreateOutcome::Created, Some(Duration::from_millis(100)))
        .unwrap();
    worker.join().unwrap();
}

#[tokio::test]
async fn test_wait_times_out() {
    let test = TestEngine::with_config(RuntimeConfig {
        o3_min_lag: Duration::from_millis(500),
        ..fast_config()
    });
    test.engine.start().unwrap();
    let client = test.engine.client().unwrap();

    let err = create_and_wait(
        &client,
        test.engine.dispatcher(),
        Statement::create_table_as("trades", 10),
        Some(Duration::from_millis(20)),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ProtocolError::TimedOut { .. }));
    // The table exists even though its rows were not awaited
    assert!(matches!(
        client.execute(Statement::create_table_as("trades", 10)).await,
        Err(e) if e.is_duplicate()
    ));
}

#[test]
fn test_panicking_listener_does_not_stall_engine() {
    let test = TestEngine::started();
    let _handle = test.engine.install_listener(|event| {
        if event.kind() == EventKind::Release {
            panic!("listener failure");
        }
    });

    let client = test.engine.client().unwrap();
    let reply = tokio_test::block_on(client.execute(Statement::create_table_as("trades", 10)));
    assert!(reply.is_ok());

    test.engine.stop();
    assert!(test.engine.dispatcher().listener_failures() >= 1);
}
