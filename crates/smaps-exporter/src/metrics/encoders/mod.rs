use std::collections::HashMap;

use super::MetricsFormat;
use crate::core::collector::CycleReport;
use crate::core::smaps::SmapsField;
use crate::core::smaps::SmapsMapping;

pub mod influx;
pub mod json;

pub const MAPPING_MEASUREMENT: &str = "process_smaps";
pub const CYCLE_MEASUREMENT: &str = "smaps_exporter_cycle";

/// Represents a field value that can be encoded in metrics
#[derive(Debug, Clone, serde::Serialize)]
pub enum FieldValue {
    UnsignedInteger(u64),
    Float(f64),
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::UnsignedInteger(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

/// Trait for encoding metrics data into different formats
pub trait MetricsEncoder: Send + Sync {
    /// Encode metrics with measurement name, tags, fields, and timestamp
    fn encode_metrics(
        &self,
        measurement: &str,
        tags: &HashMap<String, String>,
        fields: &HashMap<String, FieldValue>,
        timestamp: i64,
    ) -> String;

    /// One aggregated mapping: tagged by `comm` and `path`, one unsigned
    /// field per smaps key.
    fn encode_mapping(&self, comm: &str, mapping: &SmapsMapping, timestamp: i64) -> String {
        let tags = HashMap::from([
            ("comm".to_string(), comm.to_string()),
            ("path".to_string(), mapping.path.clone()),
        ]);

        let fields = SmapsField::ALL
            .into_iter()
            .map(|field| (field.name().to_string(), mapping.get(field).into()))
            .collect();

        self.encode_metrics(MAPPING_MEASUREMENT, &tags, &fields, timestamp)
    }

    fn encode_cycle(&self, report: &CycleReport, timestamp: i64) -> String {
        let fields = HashMap::from([
            ("processes".to_string(), (report.processes as u64).into()),
            ("mappings".to_string(), (report.mappings as u64).into()),
            ("resolve_failures".to_string(), (report.resolve_failures as u64).into()),
            ("read_failures".to_string(), (report.read_failures as u64).into()),
            ("duration_seconds".to_string(), report.duration.as_secs_f64().into()),
        ]);

        self.encode_metrics(CYCLE_MEASUREMENT, &HashMap::new(), &fields, timestamp)
    }
}

/// Line encoder of `format`; `None` for prometheus, which is not line based.
pub fn create_encoder(format: MetricsFormat) -> Option<Box<dyn MetricsEncoder>> {
    match format {
        MetricsFormat::Json => Some(Box::new(json::JsonEncoder::new())),
        MetricsFormat::Influx => Some(Box::new(influx::InfluxEncoder::new())),
        MetricsFormat::Prometheus => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn field_value_conversions() {
        assert!(matches!(FieldValue::from(7u64), FieldValue::UnsignedInteger(7)));
        assert!(matches!(FieldValue::from(0.5), FieldValue::Float(f) if f == 0.5));
    }

    #[test]
    fn json_format_selects_json_encoder() {
        let line = create_encoder(MetricsFormat::Json)
            .expect("line format")
            .encode_cycle(&CycleReport::default(), 1);

        assert!(line.starts_with('{'));
    }

    #[test]
    fn prometheus_has_no_line_encoder() {
        assert!(create_encoder(MetricsFormat::Prometheus).is_none());
    }

    #[test]
    fn cycle_line_carries_report() {
        let report = CycleReport {
            processes: 2,
            mappings: 7,
            resolve_failures: 0,
            read_failures: 1,
            duration: Duration::from_millis(500),
        };

        let line = create_encoder(MetricsFormat::Influx)
            .expect("line format")
            .encode_cycle(&report, 1);

        assert_eq!(
            line.trim_end(),
            "smaps_exporter_cycle duration_seconds=0.5,mappings=7u,processes=2u,read_failures=1u,resolve_failures=0u 1"
        );
    }
}
