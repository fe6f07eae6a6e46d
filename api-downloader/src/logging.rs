use crate::config::{LogFormat, LoggingConfig, MetricsConfig};
use downloader::metrics_defs::ALL_METRICS;
use metrics_exporter_statsd::StatsdBuilder;
use serde_json::{Map, Value};
use std::fmt::Write as _;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

const METRICS_PREFIX: &str = "api_downloader";

const ERROR_REPORTING_TYPE: &str =
    "type.googleapis.com/google.devtools.clouderrorreporting.v1beta1.ReportedErrorEvent";

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("could not set up statsd exporter: {0}")]
    Statsd(String),
    #[error("a global metrics recorder is already installed")]
    RecorderInstalled,
}

/// Installs the tracing subscriber. Level filtering follows `RUST_LOG`,
/// defaulting to `info`.
///
/// The returned guard flushes pending Sentry events on drop and must be kept
/// alive for the lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (json_layer, text_layer) = match config.format {
        LogFormat::Json => (Some(fmt::layer().event_format(CloudLoggingFormat)), None),
        LogFormat::Text => (None, Some(fmt::layer())),
    };
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_layer)
        .init();

    guard
}

/// Writes each event as one JSON object per line in the structured logging
/// shape of Cloud Logging: `severity`, `message`, `target` and the event fields
/// at the top level. Error events with an `error` field also carry the Error
/// Reporting `@type`.
pub struct CloudLoggingFormat;

impl<S, N> FormatEvent<S, N> for CloudLoggingFormat
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
        let metadata = event.metadata();
        let mut fields = JsonFields::default();
        event.record(&mut fields);

        let entry = log_entry(metadata.level(), metadata.target(), fields.0);
        let line = serde_json::to_string(&entry).map_err(|_| std::fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

fn severity(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        _ => "DEBUG",
    }
}

fn log_entry(level: &Level, target: &str, mut fields: Map<String, Value>) -> Map<String, Value> {
    let mut entry = Map::new();
    entry.insert("severity".into(), severity(level).into());
    entry.insert(
        "message".into(),
        fields.remove("message").unwrap_or_else(|| "".into()),
    );
    if *level == Level::ERROR && fields.contains_key("error") {
        entry.insert("@type".into(), ERROR_REPORTING_TYPE.into());
    }
    entry.insert("target".into(), target.into());
    for (key, value) in fields {
        entry.entry(key).or_insert(value);
    }
    entry
}

#[derive(Default)]
struct JsonFields(Map<String, Value>);

impl Visit for JsonFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.0.insert(field.name().into(), value.to_string().into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().into(), format!("{value:?}").into());
    }
}

/// Installs the statsd exporter as the global metrics recorder. Without a
/// metrics section, metrics are discarded.
pub fn init_metrics(config: Option<&MetricsConfig>) -> Result<(), TelemetryError> {
    let Some(config) = config else {
        tracing::debug!("no metrics configured, metrics are discarded");
        return Ok(());
    };

    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| TelemetryError::Statsd(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|_| TelemetryError::RecorderInstalled)?;
    shared::metrics_defs::describe_all(ALL_METRICS);

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "statsd metrics exporter installed"
    );
    Ok(())
}
