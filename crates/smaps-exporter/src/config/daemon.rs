use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use clap::Parser;

use crate::core::selector::Selector;
use crate::metrics::MetricsFormat;

/// Where to look for processes: shared by `daemon` and `resolve`.
#[derive(Args, Clone, Debug)]
pub struct TargetArgs {
    #[arg(
        long,
        env = "SMAPS_EXPORTER_PROC_PATH",
        default_value = "/proc",
        value_hint = clap::ValueHint::DirPath,
        help = "Path where the host's proc filesystem is mounted"
    )]
    pub proc_path: PathBuf,

    #[arg(
        long,
        env = "CONTAINERD_SOCKET",
        default_value = "/run/containerd/containerd.sock",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to the containerd socket, serving both the CRI and containerd APIs"
    )]
    pub containerd_socket: PathBuf,

    #[arg(
        long,
        env = "CONTAINERD_NAMESPACE",
        default_value = "k8s.io",
        help = "containerd namespace holding the Kubernetes containers"
    )]
    pub containerd_namespace: String,

    #[arg(
        long,
        env = "SMAPS_EXPORTER_FILTER",
        default_value = "default/*/*/*",
        value_parser = parse_selector,
        help = "Processes to monitor as namespace/pod/container/command. Use * as a wildcard."
    )]
    pub filter: Selector,
}

#[derive(Parser, Clone, Debug)]
pub struct DaemonArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[arg(
        long,
        env = "SMAPS_EXPORTER_LISTEN_ADDR",
        default_value = "0.0.0.0:8080",
        help = "HTTP listen address for the metrics endpoint"
    )]
    pub listen_addr: String,

    #[arg(
        long,
        env = "SMAPS_EXPORTER_SCRAPE_INTERVAL_MS",
        default_value = "1000",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Collection interval in milliseconds"
    )]
    pub scrape_interval_ms: u64,

    #[arg(
        long,
        env = "SMAPS_EXPORTER_METRICS_FORMAT",
        value_enum,
        default_value = "prometheus",
        help = "Metrics format: prometheus gauges on the HTTP endpoint, or influx/json lines in the metrics file"
    )]
    pub metrics_format: MetricsFormat,

    #[arg(
        long,
        env = "SMAPS_EXPORTER_METRICS_FILE",
        value_hint = clap::ValueHint::FilePath,
        default_value = "logs/metrics.log",
        help = "File receiving influx/json metric lines, rotated daily"
    )]
    pub metrics_file: PathBuf,

    #[arg(
        long,
        env = "SMAPS_EXPORTER_LOG_LEVEL",
        default_value = "info",
        help = "Log level: trace, debug, info, warn, error, none, or a full filter directive. RUST_LOG takes precedence."
    )]
    pub log_level: String,
}

impl DaemonArgs {
    pub fn scrape_interval(&self) -> Duration {
        Duration::from_millis(self.scrape_interval_ms)
    }

    /// Metrics file, only for the formats that write lines to it.
    pub fn metrics_output(&self) -> Option<&Path> {
        match self.metrics_format {
            MetricsFormat::Prometheus => None,
            MetricsFormat::Influx | MetricsFormat::Json => Some(self.metrics_file.as_path()),
        }
    }
}

/// Parse a `namespace/pod/container/command` filter
fn parse_selector(s: &str) -> Result<Selector, String> {
    s.parse::<Selector>().map_err(|e| e.to_string())
}
