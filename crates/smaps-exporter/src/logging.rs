//! Daemon logging: human readable logs on stderr, encoded metric lines in a
//! daily rotated file.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use tracing::field::Field;
use tracing::field::Visit;
use tracing::Event;
use tracing::Metadata;
use tracing::Subscriber;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::FilterExt;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::FormatEvent;
use tracing_subscriber::fmt::FormatFields;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use tracing_subscriber::registry::LookupSpan;

/// Target of every pre-encoded metric line.
pub const METRICS_TARGET: &str = "metrics";

const METRICS_FIELD: &str = "msg";

fn is_metrics_event(metadata: &Metadata<'_>) -> bool {
    metadata.target() == METRICS_TARGET
}

/// Writes the `msg` field of an event as is, one line per event.
struct LineFormatter;

#[derive(Default)]
struct LineVisitor {
    line: Option<String>,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == METRICS_FIELD {
            self.line = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == METRICS_FIELD {
            self.line = Some(format!("{value:?}"));
        }
    }
}

impl<S, N> FormatEvent<S, N> for LineFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let Some(line) = visitor.line else {
            return Ok(());
        };
        let line = line.trim_end_matches('\n');
        if line.is_empty() {
            return Ok(());
        }
        writeln!(writer, "{line}")
    }
}

/// Opens the daily rotated metrics file and its background writer.
fn metrics_writer(metrics_file: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let dir = match metrics_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = metrics_file
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("invalid metrics file {}", metrics_file.display()))?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create metrics directory {}", dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(3)
        .build(dir)
        .context("failed to create rolling file appender")?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Builds the daemon subscriber. The metrics file layer only exists when
/// `metrics_file` is given; without it nothing touches the filesystem.
fn subscriber(
    level: &str,
    metrics_file: Option<&Path>,
) -> Result<(impl Subscriber + Send + Sync + 'static, Option<WorkerGuard>)> {
    let (metrics_layer, file_guard) = match metrics_file {
        Some(path) => {
            let (file_writer, file_guard) = metrics_writer(path)?;
            let metrics_layer = layer()
                .event_format(LineFormatter)
                .fmt_fields(tracing_subscriber::fmt::format::DefaultFields::new())
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(filter::filter_fn(is_metrics_event));
            (Some(metrics_layer), Some(file_guard))
        }
        None => (None, None),
    };

    let fmt_layer = utils::logging::get_fmt_layer().with_filter(
        utils::logging::env_filter(level).and(filter::filter_fn(|metadata| !is_metrics_event(metadata))),
    );

    Ok((registry().with(fmt_layer).with(metrics_layer), file_guard))
}

/// Initiates the global tracing subscriber of the daemon.
///
/// Metric lines go to `metrics_file` when given. The returned guard flushes
/// that file when dropped and must live as long as the daemon.
///
/// # Errors
///
/// Fails if the directory of `metrics_file` cannot be created, the rolling
/// appender cannot be opened or a global subscriber is already installed.
pub fn init(level: &str, metrics_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let (subscriber, file_guard) = subscriber(level, metrics_file)?;
    subscriber
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(file_guard)
}
