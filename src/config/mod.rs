//! Configuration module for inproc_engine.
//!
//! The engine root holds two generated files: `conf/server.conf` (worker
//! pools, feature toggles, commit-lag bounds) and `conf/log.conf`. Both are
//! flat `key=value` files; `ENGINE_*` environment variables override
//! server.conf keys, and `LOG_LEVEL` / `RUST_LOG` override the log level.
//!
//! # Example
//!
//! ```rust,ignore
//! use inproc_engine::config::{Config, ConfigBootstrapper};
//!
//! let layout = ConfigBootstrapper::new("engine_root").ensure()?;
//! let config = Config::load(&layout)?;
//! println!("Shared workers: {}", config.runtime.shared_workers);
//! ```

mod bootstrap;
mod error;
mod logging;
mod parse;
mod runtime;

pub use bootstrap::{ConfigBootstrapper, RuntimeLayout, DIR_MODE};
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use parse::{env_duration, env_opt, env_or, parse_duration, Properties, ENV_PREFIX};
pub use runtime::RuntimeConfig;

/// Complete application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Engine runtime configuration.
    pub runtime: RuntimeConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load both files of a bootstrapped layout.
    pub fn load(layout: &RuntimeLayout) -> Result<Self, ConfigError> {
        let log_props = Properties::load(&layout.log_conf)?;
        Ok(Self {
            runtime: RuntimeConfig::load(&layout.server_conf)?,
            logging: LoggingConfig::from_env()?.merge_log_conf(&log_props, &layout.root),
        })
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use tracing::info;

        let runtime = &self.runtime;
        info!("Configuration loaded:");
        info!(
            "  Workers: shared={} query={} ingest={}",
            runtime.shared_workers, runtime.query_workers, runtime.ingest_workers
        );
        info!(
            "  Commit lag: {}ms (max {}ms)",
            runtime.commit_lag().as_millis(),
            runtime.o3_max_lag.as_millis()
        );
        info!("  WAL by default: {}", runtime.wal_enabled_default);

        if runtime.metrics_enabled {
            info!("  Metrics: enabled");
        }

        if let Some(ref file) = self.logging.file {
            info!("  Log file: {}", file.display());
        }
    }
}
