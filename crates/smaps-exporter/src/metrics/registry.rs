//! Prometheus registry holding the smaps gauges and exporter self-metrics.

use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use prometheus::Gauge;
use prometheus::GaugeVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;

use super::MetricsError;
use super::MetricsSink;
use crate::core::collector::CycleReport;
use crate::core::resolver::ResolveError;
use crate::core::smaps::SmapsField;
use crate::core::smaps::SmapsMapping;

const MAPPING_LABELS: [&str; 2] = ["comm", "path"];

/// Stage label values of `smaps_exporter_scrape_errors_total`.
const STAGE_CYCLE: &str = "cycle";
const STAGE_RESOLVE: &str = "resolve";
const STAGE_READ: &str = "read";

pub struct PrometheusSink {
    registry: Registry,
    gauges: Vec<(SmapsField, GaugeVec)>,
    cycles_total: IntCounter,
    errors_total: IntCounterVec,
    duration_seconds: Gauge,
}

fn register<M>(registry: &Registry, name: &str, metric: M) -> Result<M, Report<MetricsError>>
where
    M: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(metric.clone()))
        .change_context_lazy(|| MetricsError::Registration {
            name: name.to_string(),
        })?;
    Ok(metric)
}

impl PrometheusSink {
    /// Creates a sink with its own registry.
    ///
    /// # Errors
    ///
    /// - [`MetricsError::Registration`] if a metric cannot be created or registered
    pub fn new() -> Result<Self, Report<MetricsError>> {
        let registry = Registry::new();

        let gauges = SmapsField::ALL
            .into_iter()
            .map(|field| {
                let name = field.metric_name();
                let gauge = GaugeVec::new(Opts::new(name.as_str(), field.help()), &MAPPING_LABELS)
                    .change_context_lazy(|| MetricsError::Registration { name: name.clone() })?;
                Ok((field, register(&registry, &name, gauge)?))
            })
            .collect::<Result<Vec<_>, Report<MetricsError>>>()?;

        let name = "smaps_exporter_scrape_cycles_total";
        let cycles_total = IntCounter::new(name, "Total number of collection cycles run.")
            .change_context_lazy(|| MetricsError::Registration {
                name: name.to_string(),
            })?;
        let cycles_total = register(&registry, name, cycles_total)?;

        let name = "smaps_exporter_scrape_errors_total";
        let errors_total = IntCounterVec::new(
            Opts::new(name, "Total number of failures during collection, by stage."),
            &["stage"],
        )
        .change_context_lazy(|| MetricsError::Registration {
            name: name.to_string(),
        })?;
        let errors_total = register(&registry, name, errors_total)?;

        let name = "smaps_exporter_scrape_duration_seconds";
        let duration_seconds = Gauge::new(name, "Duration of the last collection cycle in seconds.")
            .change_context_lazy(|| MetricsError::Registration {
                name: name.to_string(),
            })?;
        let duration_seconds = register(&registry, name, duration_seconds)?;

        Ok(Self {
            registry,
            gauges,
            cycles_total,
            errors_total,
            duration_seconds,
        })
    }

    /// Text exposition of everything in the registry.
    ///
    /// # Errors
    ///
    /// - [`MetricsError::Encoding`] if the metric families cannot be encoded
    pub fn gather_text(&self) -> Result<String, Report<MetricsError>> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .change_context(MetricsError::Encoding)
    }

    fn count_errors(&self, stage: &str, count: usize) {
        if count > 0 {
            self.errors_total
                .with_label_values(&[stage])
                .inc_by(count as u64);
        }
    }
}

impl MetricsSink for PrometheusSink {
    fn record_mapping(&self, comm: &str, mapping: &SmapsMapping) {
        let labels = [comm, mapping.path.as_str()];
        for (field, gauge) in &self.gauges {
            gauge
                .with_label_values(&labels)
                .set(mapping.get(*field) as f64);
        }
    }

    fn record_cycle(&self, report: &CycleReport) {
        self.cycles_total.inc();
        self.count_errors(STAGE_RESOLVE, report.resolve_failures);
        self.count_errors(STAGE_READ, report.read_failures);
        self.duration_seconds.set(report.duration.as_secs_f64());
    }

    fn record_failed_cycle(&self, _error: &ResolveError, duration: Duration) {
        self.cycles_total.inc();
        self.count_errors(STAGE_CYCLE, 1);
        self.duration_seconds.set(duration.as_secs_f64());
    }
}
