//! Subscriber setup and the unified JSON line format.
//!
//! Log format:
//! ```json
//! {"ts":"2024-12-28T15:04:05.123Z","level":"info","type":"app","msg":"Data ready","ctx":{"service":"inproc_engine","thread":"shared-0"},"data":{}}
//! ```

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{ConfigError, LogFormat, LoggingConfig};
use crate::time::Iso8601Timestamp;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Install the global subscriber described by `config`.
///
/// Returns an error if the log file cannot be opened or a subscriber is
/// already installed.
pub fn init(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.stdout {
        layers.push(build_layer(config, std::io::stdout, true));
    }

    if let Some(ref path) = config.file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ConfigError::io(path, e))?;
        layers.push(build_layer(config, Mutex::new(file), false));
    }

    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    Ok(())
}

fn build_layer<W>(config: &LoggingConfig, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .event_format(JsonFormatter::new(&config.service_name))
            .with_writer(writer)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_thread_names(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
    }
}

/// Custom JSON formatter for tracing.
pub struct JsonFormatter {
    service_name: String,
}

impl JsonFormatter {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        writeln!(
            writer,
            "{}",
            render(
                &self.service_name,
                *meta.level(),
                meta.target(),
                Iso8601Timestamp::now().as_str(),
                std::thread::current().name(),
                event,
            )
        )
    }
}

fn render(
    service: &str,
    level: Level,
    target: &str,
    ts: &str,
    thread: Option<&str>,
    event: &Event<'_>,
) -> String {
    let mut visitor = FieldVisitor::new();
    event.record(&mut visitor);
    let entry = build_entry(service, level, target, ts, thread, visitor);
    serde_json::to_string(&entry).unwrap_or_default()
}

fn build_entry(
    service: &str,
    level: Level,
    target: &str,
    ts: &str,
    thread: Option<&str>,
    visitor: FieldVisitor,
) -> serde_json::Value {
    let level_str = match level {
        Level::TRACE | Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    };

    // Lifecycle events get their own type so they can be filtered out
    let log_type = if target.ends_with("::events") || target == "events" {
        "event"
    } else if level == Level::ERROR {
        "error"
    } else {
        "app"
    };

    let mut ctx = serde_json::Map::new();
    ctx.insert("service".into(), serde_json::json!(service));
    if let Some(thread) = thread {
        ctx.insert("thread".into(), serde_json::json!(thread));
    }

    serde_json::json!({
        "ts": ts,
        "level": level_str,
        "type": log_type,
        "msg": visitor.message.unwrap_or_default(),
        "ctx": ctx,
        "data": visitor.fields,
    })
}

/// Field visitor for collecting tracing fields.
struct FieldVisitor {
    message: Option<String>,
    fields: HashMap<String, serde_json::Value>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: HashMap::new(),
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value).trim_matches('"').to_string());
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(format!("{:?}", value)),
            );
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }
}
