//! Engine runtime configuration (`conf/server.conf`).

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use super::parse::Properties;
use super::ConfigError;

/// Worker topology and tuning bounds consumed by the engine at start.
///
/// Pool sizes are fixed for the lifetime of the engine.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Workers running deferred apply jobs.
    pub shared_workers: NonZeroUsize,
    /// Workers executing client statements.
    pub query_workers: NonZeroUsize,
    /// Workers appending ingested rows.
    pub ingest_workers: NonZeroUsize,
    /// Queue capacity per pool (0 = workers * 100).
    pub queue_capacity: usize,
    /// New tables go through the write-ahead log.
    pub wal_enabled_default: bool,
    pub metrics_enabled: bool,
    pub telemetry_enabled: bool,
    /// Upper bound on commit lag.
    pub o3_max_lag: Duration,
    /// Delay between acknowledging a write and making its rows visible.
    pub o3_min_lag: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shared_workers: NonZeroUsize::new(2).unwrap_or(NonZeroUsize::MIN),
            query_workers: NonZeroUsize::MIN,
            ingest_workers: NonZeroUsize::MIN,
            queue_capacity: 0,
            wal_enabled_default: true,
            metrics_enabled: true,
            telemetry_enabled: true,
            o3_max_lag: Duration::from_millis(600_000),
            o3_min_lag: Duration::from_millis(1_000),
        }
    }
}

impl RuntimeConfig {
    /// Load from a properties file, then apply `ENGINE_*` overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_properties(&Properties::load(path)?.with_env_overrides())
    }

    /// Build from parsed properties. Missing keys take built-in defaults.
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            shared_workers: props.positive("shared.worker.count", defaults.shared_workers.get())?,
            query_workers: props.positive("query.worker.count", defaults.query_workers.get())?,
            ingest_workers: props.positive(
                "ingest.writer.worker.count",
                defaults.ingest_workers.get(),
            )?,
            queue_capacity: props.parse_or("worker.queue.capacity", defaults.queue_capacity)?,
            wal_enabled_default: props.flag("wal.enabled.default", defaults.wal_enabled_default)?,
            metrics_enabled: props.flag("metrics.enabled", defaults.metrics_enabled)?,
            telemetry_enabled: props.flag("telemetry.enabled", defaults.telemetry_enabled)?,
            o3_max_lag: props.millis("o3.max.lag", defaults.o3_max_lag.as_millis() as u64)?,
            o3_min_lag: props.millis("o3.min.lag", defaults.o3_min_lag.as_millis() as u64)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.o3_min_lag > self.o3_max_lag {
            return Err(ConfigError::Invalid {
                key: "o3.min.lag".into(),
                message: format!(
                    "{}ms exceeds o3.max.lag {}ms",
                    self.o3_min_lag.as_millis(),
                    self.o3_max_lag.as_millis()
                ),
            });
        }
        Ok(())
    }

    /// Commit lag applied to deferred writes.
    pub fn commit_lag(&self) -> Duration {
        self.o3_min_lag.min(self.o3_max_lag)
    }

    /// Resolved queue capacity for a pool with `workers` threads.
    pub fn queue_capacity_for(&self, workers: NonZeroUsize) -> usize {
        if self.queue_capacity == 0 {
            workers.get() * 100
        } else {
            self.queue_capacity
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config = RuntimeConfig::from_properties(&Properties::default()).unwrap();
        assert_eq!(config.shared_workers.get(), 2);
        assert_eq!(config.query_workers.get(), 1);
        assert!(config.wal_enabled_default);
        assert_eq!(config.o3_min_lag, Duration::from_secs(1));
        assert_eq!(config.queue_capacity_for(config.shared_workers), 200);
    }

    #[test]
    fn test_generated_server_conf() {
        let props = Properties::parse(
            "query.cache.enabled=false\n\
             select.cache.enabled=false\n\
             wal.enabled.default=false\n\
             metrics.enabled=false\n\
             shared.worker.count=2\n\
             query.worker.count=1\n\
             ingest.writer.worker.count=1\n\
             o3.max.lag=10000\n\
             o3.min.lag=2000\n\
             some.future.key=ignored\n",
        );
        let config = RuntimeConfig::from_properties(&props).unwrap();

        assert!(!config.wal_enabled_default);
        assert!(!config.metrics_enabled);
        assert!(config.telemetry_enabled);
        assert_eq!(config.o3_max_lag, Duration::from_millis(10_000));
        assert_eq!(config.commit_lag(), Duration::from_millis(2_000));
    }

    #[test]
    fn test_cache_keys_are_accepted() {
        let props = Properties::parse(
            "query.cache.enabled=false\n\
             select.cache.enabled=not-a-bool\n\
             update.cache.enabled=true\n",
        );
        assert!(RuntimeConfig::from_properties(&props).is_ok());
    }

    #[test]
    fn test_rejects_zero_workers() {
        let props = Properties::parse("query.worker.count=0");
        let err = RuntimeConfig::from_properties(&props).unwrap_err();
        assert!(err.to_string().contains("query.worker.count"));
    }

    #[test]
    fn test_rejects_inverted_lag_bounds() {
        let props = Properties::parse("o3.max.lag=100\no3.min.lag=500");
        assert!(matches!(
            RuntimeConfig::from_properties(&props),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_explicit_queue_capacity() {
        let props = Properties::parse("worker.queue.capacity=16");
        let config = RuntimeConfig::from_properties(&props).unwrap();
        assert_eq!(config.queue_capacity_for(NonZeroUsize::MIN), 16);
    }
}
