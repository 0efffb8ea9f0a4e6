use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use inproc_engine::config::{env_duration, env_or, Config, ConfigBootstrapper, RuntimeLayout};
use inproc_engine::engine::{EngineClient, EngineLifecycle, Query, Reply, Statement, Symbol};
use inproc_engine::protocol::create_and_wait;
use inproc_engine::time::Iso8601Timestamp;
use inproc_engine::{logging, VERSION};

const TABLE: &str = "trades";

/// 2022-12-01T00:00:00Z
const RANGE_FROM_MICROS: i64 = 1_669_852_800_000_000;
/// 2023-02-28T23:59:59.999999Z
const RANGE_TO_MICROS: i64 = 1_677_628_800_000_000 - 1;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let root = env_or("ENGINE_ROOT", "engine_root");

    // Nothing can run without a root; logging is not up yet either
    let layout = match ConfigBootstrapper::new(&root).ensure() {
        Ok(layout) => layout,
        Err(e) => {
            eprintln!("Failed to prepare engine root '{}': {}", root, e);
            std::process::exit(1);
        }
    };

    let config = Config::load(&layout)?;
    logging::init(&config.logging)?;

    info!("Starting inproc_engine {}", VERSION);
    if layout.created {
        info!(root = %layout.root.display(), "runtime configuration created");
    }
    config.log_summary();

    let gate_timeout = env_duration("GATE_TIMEOUT", "off")?;
    let rows: usize = env_or("TRADE_ROWS", "4000000").parse()?;

    // Engine work runs on its own pools; the caller only awaits replies
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async_main(layout, config, rows, gate_timeout));

    // An interrupted wait leaves its blocking task parked on the gate
    runtime.shutdown_background();
    result
}

async fn async_main(
    layout: RuntimeLayout,
    config: Config,
    rows: usize,
    gate_timeout: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let engine = EngineLifecycle::with_config(layout, &config);

    if let Err(e) = engine.start() {
        error!(error = %e, "engine failed to start");
        if e.is_fatal() {
            std::process::exit(1);
        }
        return Err(e.into());
    }

    let client = engine.client()?;
    let statement = Statement::create_table_as(TABLE, rows);

    tokio::select! {
        result = create_and_wait(&client, engine.dispatcher(), statement, gate_timeout) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down...");
            engine.stop();
            return Ok(());
        }
    }

    let query = Query::table(TABLE)
        .symbol(Symbol::Euro)
        .price_above(49.99)
        .amount_above(15.0)
        .between(RANGE_FROM_MICROS, RANGE_TO_MICROS);

    let started = Instant::now();
    match client.execute(Statement::Select(query)).await? {
        Reply::Rows(trades) => {
            for trade in &trades {
                info!(
                    "{} {} {} {}",
                    trade.symbol,
                    trade.price,
                    trade.amount,
                    Iso8601Timestamp::from_micros(trade.timestamp)
                );
            }
            info!(rows = trades.len(), "query complete");
        }
        other => warn!(reply = ?other, "unexpected reply to select"),
    }
    info!("Took: {} ms", started.elapsed().as_millis());

    engine.stop();
    Ok(())
}
