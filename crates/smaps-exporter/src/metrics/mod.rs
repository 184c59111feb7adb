//! Publishing of smaps observations.
//!
//! The collector writes into a [`MetricsSink`]. Two families exist:
//! [`registry::PrometheusSink`] keeps one gauge per smaps field in a
//! registry served over HTTP, while [`EncoderSink`] renders each record as an
//! influx or JSON line on the `metrics` tracing target, which the daemon's
//! logging routes to the metrics file.

use core::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use derive_more::Display;

use crate::core::collector::CycleReport;
use crate::core::resolver::ResolveError;
use crate::core::smaps::SmapsMapping;

pub mod encoders;
pub mod registry;

use encoders::create_encoder;
use encoders::MetricsEncoder;
pub use registry::PrometheusSink;

#[derive(Debug, Display)]
pub enum MetricsError {
    #[display("failed to register metric {name}")]
    Registration { name: String },
    #[display("failed to encode metrics")]
    Encoding,
}

impl Error for MetricsError {}

/// Output format of smaps observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MetricsFormat {
    /// Gauges served on the HTTP endpoint
    Prometheus,
    /// InfluxDB line protocol written to the metrics file
    Influx,
    /// One JSON object per line written to the metrics file
    Json,
}

/// Destination of everything the collector observes. Implementations are
/// shared across tasks and synchronise internally.
pub trait MetricsSink: Send + Sync {
    fn record_mapping(&self, comm: &str, mapping: &SmapsMapping);

    fn record_cycle(&self, _report: &CycleReport) {}

    fn record_failed_cycle(&self, _error: &ResolveError, _duration: Duration) {}
}

/// Builds the sink for `format`. Cycle statistics always land in `registry`
/// so the HTTP endpoint reports exporter health in every format.
pub fn create_sink(format: MetricsFormat, registry: Arc<PrometheusSink>) -> Arc<dyn MetricsSink> {
    match create_encoder(format) {
        Some(encoder) => Arc::new(EncoderSink::new(encoder, registry)),
        None => registry,
    }
}

/// Writes each record as one encoded line on the `metrics` target.
pub struct EncoderSink {
    encoder: Box<dyn MetricsEncoder>,
    registry: Arc<PrometheusSink>,
}

impl EncoderSink {
    pub fn new(encoder: Box<dyn MetricsEncoder>, registry: Arc<PrometheusSink>) -> Self {
        Self { encoder, registry }
    }
}

impl MetricsSink for EncoderSink {
    fn record_mapping(&self, comm: &str, mapping: &SmapsMapping) {
        let line = self.encoder.encode_mapping(comm, mapping, current_time());
        tracing::info!(target: "metrics", msg = %line);
    }

    fn record_cycle(&self, report: &CycleReport) {
        let line = self.encoder.encode_cycle(report, current_time());
        tracing::info!(target: "metrics", msg = %line);
        self.registry.record_cycle(report);
    }

    fn record_failed_cycle(&self, error: &ResolveError, duration: Duration) {
        self.registry.record_failed_cycle(error, duration);
    }
}

/// Nanoseconds since the epoch, as used by the line encoders.
fn current_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

// Wrapper struct for Vec<u8> that implements Display
pub struct BytesWrapper(Vec<u8>);

impl fmt::Display for BytesWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl From<Vec<u8>> for BytesWrapper {
    fn from(bytes: Vec<u8>) -> Self {
        BytesWrapper(bytes)
    }
}
