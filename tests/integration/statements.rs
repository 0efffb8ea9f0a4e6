//! Statement routing, filtering and resource events.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use inproc_engine::engine::{
    ClientError, EngineClient, Query, Reply, Statement, Symbol, Trade, TRADES_EPOCH_MICROS,
};
use inproc_engine::events::{EventKind, ResourceCategory};
use inproc_engine::protocol::create_and_wait;

use crate::helpers::*;

fn trade(symbol: Symbol, price: f64, amount: f64, offset_secs: i64) -> Trade {
    Trade {
        symbol,
        price,
        amount,
        timestamp: TRADES_EPOCH_MICROS + offset_secs * 1_000_000,
    }
}

async fn create_empty(test: &TestEngine, table: &str) {
    let client = test.engine.client().unwrap();
    create_and_wait(
        &client,
        test.engine.dispatcher(),
        Statement::create_table_as(table, 0),
        Some(Duration::from_secs(10)),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_insert_then_filtered_select() {
    let test = TestEngine::started();
    create_empty(&test, "trades").await;
    let client = test.engine.client().unwrap();

    let rows = vec![
        trade(Symbol::Euro, 49.995, 16.0, 10),
        trade(Symbol::Euro, 49.0, 16.0, 20),
        trade(Symbol::Usd, 49.995, 16.0, 30),
        trade(Symbol::Euro, 49.999, 19.5, 40),
        trade(Symbol::Euro, 49.999, 19.5, 86_400 * 365),
    ];
    let reply = client
        .execute(Statement::Insert {
            table: "trades".into(),
            rows: rows.clone(),
        })
        .await
        .unwrap();
    assert_eq!(reply, Reply::Inserted { rows: 5 });

    let query = Query::table("trades")
        .symbol(Symbol::Euro)
        .price_above(49.99)
        .amount_above(15.0)
        .between(TRADES_EPOCH_MICROS, TRADES_EPOCH_MICROS + 86_400 * 60 * 1_000_000);

    let reply = client.execute(Statement::Select(query)).await.unwrap();
    assert_eq!(reply, Reply::Rows(vec![rows[0], rows[3]]));
}

#[tokio::test]
async fn test_insert_runs_on_ingest_pool() {
    let test = TestEngine::started();
    create_empty(&test, "trades").await;

    let threads = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&threads);
    let _handle = test.engine.install_listener(move |e| {
        if e.category() == ResourceCategory::Writer && e.kind() == EventKind::Acquire {
            sink.lock().unwrap().push(e.thread_name().unwrap_or("").to_string());
        }
    });

    let client = test.engine.client().unwrap();
    client
        .execute(Statement::Insert {
            table: "trades".into(),
            rows: vec![trade(Symbol::Usd, 1.0, 1.0, 1)],
        })
        .await
        .unwrap();

    assert_eq!(*threads.lock().unwrap(), vec!["ingest-0".to_string()]);
}

#[tokio::test]
async fn test_drop_table() {
    let test = TestEngine::started();
    create_empty(&test, "trades").await;

    let (seen, listener) = recorder();
    let _handle = test.engine.install_listener(listener);

    let client = test.engine.client().unwrap();
    let reply = client
        .execute(Statement::Drop {
            table: "trades".into(),
        })
        .await
        .unwrap();
    assert_eq!(reply, Reply::Dropped);

    assert_eq!(count(&seen, ResourceCategory::Writer, EventKind::Lock, "trades"), 1);
    assert_eq!(count(&seen, ResourceCategory::Metadata, EventKind::Remove, "trades"), 1);
    assert_eq!(count(&seen, ResourceCategory::Writer, EventKind::Remove, "trades"), 1);

    let err = client
        .execute(Statement::Select(Query::table("trades")))
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::NotFound("trades".into()));
}

#[tokio::test]
async fn test_select_emits_reader_events() {
    let test = TestEngine::started();
    create_empty(&test, "trades").await;

    let (seen, listener) = recorder();
    let _handle = test.engine.install_listener(listener);

    let client = test.engine.client().unwrap();
    client
        .execute(Statement::Select(Query::table("trades")))
        .await
        .unwrap();

    assert_eq!(count(&seen, ResourceCategory::Reader, EventKind::Acquire, "trades"), 1);
    assert_eq!(count(&seen, ResourceCategory::Reader, EventKind::Release, "trades"), 1);
}

#[tokio::test]
async fn test_stats_and_expire_on_stop() {
    let test = TestEngine::started();
    create_empty(&test, "trades").await;

    let client = test.engine.client().unwrap();
    let _ = client.execute(Statement::create_table_as("trades", 1)).await;
    let stats = test.engine.stats().unwrap();
    assert_eq!(stats.statements, 2);
    assert_eq!(stats.failed_statements, 1);
    assert_eq!(stats.apply_jobs, 1);

    let (seen, listener) = recorder();
    let _handle = test.engine.install_listener(listener);
    test.engine.stop();
    assert_eq!(count(&seen, ResourceCategory::Writer, EventKind::Expire, "trades"), 1);
}
