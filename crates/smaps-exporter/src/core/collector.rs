use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use error_stack::Report;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::core::resolver::ProcessResolver;
use crate::core::resolver::ResolveError;
use crate::core::selector::Selector;
use crate::metrics::MetricsSink;

/// Summary of one completed collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Processes whose report was read and emitted.
    pub processes: usize,
    /// Aggregated mapping records emitted.
    pub mappings: usize,
    /// Lookups skipped during resolution.
    pub resolve_failures: usize,
    /// Processes skipped because `comm` or `smaps` could not be read.
    pub read_failures: usize,
    pub duration: Duration,
}

impl CycleReport {
    pub fn failures(&self) -> usize {
        self.resolve_failures + self.read_failures
    }
}

/// Periodically resolves the selector and publishes every process's smaps
/// accounting into the sink.
pub struct SmapsCollector {
    resolver: ProcessResolver,
    selector: Selector,
    sink: Arc<dyn MetricsSink>,
}

impl SmapsCollector {
    pub fn new(resolver: ProcessResolver, selector: Selector, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            resolver,
            selector,
            sink,
        }
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Runs a single cycle.
    ///
    /// PIDs may vanish between resolution and reading; such processes are
    /// counted in [`CycleReport::read_failures`] and skipped.
    ///
    /// # Errors
    ///
    /// Any [`ResolveError`] that left the cycle without processes.
    pub async fn collect_once(&self) -> Result<CycleReport, Report<ResolveError>> {
        let started = Instant::now();

        let resolution = match self.resolver.resolve_with_failures(&self.selector).await {
            Ok(resolution) => resolution,
            Err(e) => {
                self.sink.record_failed_cycle(e.current_context(), started.elapsed());
                return Err(e);
            }
        };

        let mut report = CycleReport {
            resolve_failures: resolution.failures,
            ..Default::default()
        };
        let procfs = self.resolver.procfs();

        for pid in resolution.pids {
            debug!(pid, selector = %self.selector, "processing smaps");

            let comm = match procfs.comm(pid).await {
                Ok(comm) => comm,
                Err(e) => {
                    warn!(pid, error = ?e, "failed to read comm, skipping process");
                    report.read_failures += 1;
                    continue;
                }
            };

            let mappings = match procfs.smaps(pid).await {
                Ok(mappings) => mappings,
                Err(e) => {
                    warn!(pid, comm = %comm, error = ?e, "failed to read smaps, skipping process");
                    report.read_failures += 1;
                    continue;
                }
            };

            for mapping in &mappings {
                self.sink.record_mapping(&comm, mapping);
            }
            report.processes += 1;
            report.mappings += mappings.len();
        }

        report.duration = started.elapsed();
        self.sink.record_cycle(&report);
        Ok(report)
    }

    /// Collects every `interval` until `token` is cancelled. A cycle always
    /// runs to completion; ticks missed meanwhile are dropped.
    pub async fn run(&self, interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Collector shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    match self.collect_once().await {
                        Ok(report) => debug!(
                            processes = report.processes,
                            mappings = report.mappings,
                            failures = report.failures(),
                            duration = ?report.duration,
                            "collection cycle completed"
                        ),
                        Err(e) => error!(error = ?e, "failed to get host PIDs"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::core::resolver::testing::container;
    use crate::core::resolver::testing::sandbox;
    use crate::core::resolver::testing::FakeControlPlane;
    use crate::core::resolver::testing::FakeRuntime;
    use crate::core::runtime::ContainerState;
    use crate::core::smaps::SmapsMapping;
    use crate::platform::procfs::testing::fake_process;
    use crate::platform::procfs::testing::fake_smaps;
    use crate::platform::procfs::ProcFs;

    #[derive(Default)]
    struct RecordingSink {
        mappings: Mutex<Vec<(String, SmapsMapping)>>,
        cycles: Mutex<Vec<CycleReport>>,
        failed_cycles: Mutex<usize>,
    }

    impl MetricsSink for RecordingSink {
        fn record_mapping(&self, comm: &str, mapping: &SmapsMapping) {
            self.mappings
                .lock()
                .expect("poisoned")
                .push((comm.to_string(), mapping.clone()));
        }

        fn record_cycle(&self, report: &CycleReport) {
            self.cycles.lock().expect("poisoned").push(report.clone());
        }

        fn record_failed_cycle(&self, _error: &ResolveError, _duration: Duration) {
            *self.failed_cycles.lock().expect("poisoned") += 1;
        }
    }

    fn collector(root: &std::path::Path, sink: Arc<RecordingSink>, filter: &str) -> SmapsCollector {
        let control_plane = FakeControlPlane {
            sandboxes: vec![sandbox("default", "web-1", "uid-web")],
            containers: HashMap::from([(
                "uid-web".to_string(),
                vec![container("c-web", "web", ContainerState::Running)],
            )]),
            ..Default::default()
        };
        let runtime = FakeRuntime {
            init_pids: HashMap::from([("c-web".to_string(), 10)]),
        };
        let resolver = ProcessResolver::new(
            Arc::new(control_plane),
            Arc::new(runtime),
            ProcFs::new(root),
        );
        SmapsCollector::new(resolver, filter.parse().expect("valid selector"), sink)
    }

    #[test(tokio::test)]
    async fn emits_every_mapping_with_comm() {
        let root = tempfile::tempdir().expect("tempdir");
        fake_process(root.path(), 10, 100, "nginx");
        fake_smaps(
            root.path(),
            10,
            "\
00400000-00401000 r-xp 00000000 08:01 1 /usr/sbin/nginx
Rss: 8 kB
7ffd0000-7ffd1000 rw-p 00000000 00:00 0
Rss: 4 kB
",
        );
        let sink = Arc::new(RecordingSink::default());

        let report = collector(root.path(), sink.clone(), "default/*/*/*")
            .collect_once()
            .await
            .expect("cycle succeeds");

        assert_eq!(report.processes, 1);
        assert_eq!(report.mappings, 2);
        assert_eq!(report.failures(), 0);
        let mappings = sink.mappings.lock().expect("poisoned");
        let seen: Vec<(&str, &str, u64)> = mappings
            .iter()
            .map(|(comm, m)| (comm.as_str(), m.path.as_str(), m.rss))
            .collect();
        assert_eq!(
            seen,
            vec![("nginx", "/usr/sbin/nginx", 8192), ("nginx", "[anon]", 4096)]
        );
        assert_eq!(sink.cycles.lock().expect("poisoned").len(), 1);
    }

    #[test(tokio::test)]
    async fn unreadable_smaps_skips_only_that_process() {
        let root = tempfile::tempdir().expect("tempdir");
        fake_process(root.path(), 10, 100, "nginx");
        fake_process(root.path(), 11, 100, "worker");
        fake_smaps(root.path(), 10, "00400000-00401000 r-xp 00000000 08:01 1 /a\nSize: 4 kB\n");
        let sink = Arc::new(RecordingSink::default());

        let report = collector(root.path(), sink.clone(), "default/*/*/*")
            .collect_once()
            .await
            .expect("cycle succeeds");

        assert_eq!(report.processes, 1);
        assert_eq!(report.read_failures, 1);
        assert_eq!(sink.mappings.lock().expect("poisoned").len(), 1);
    }

    #[test(tokio::test)]
    async fn resolve_failure_is_reported_to_sink() {
        let root = tempfile::tempdir().expect("tempdir");
        let sink = Arc::new(RecordingSink::default());

        let err = collector(root.path(), sink.clone(), "other/*/*/*")
            .collect_once()
            .await
            .expect_err("no pods in namespace other");

        assert!(matches!(err.current_context(), ResolveError::PodNotFound { .. }));
        assert_eq!(*sink.failed_cycles.lock().expect("poisoned"), 1);
        assert!(sink.cycles.lock().expect("poisoned").is_empty());
    }

    #[test(tokio::test)]
    async fn run_stops_on_cancellation() {
        let root = tempfile::tempdir().expect("tempdir");
        fake_process(root.path(), 10, 100, "nginx");
        fake_smaps(root.path(), 10, "00400000-00401000 r-xp 00000000 08:01 1 /a\nSize: 4 kB\n");
        let sink = Arc::new(RecordingSink::default());
        let collector = collector(root.path(), sink.clone(), "default/*/*/*");
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                token.cancel();
            }
        };
        tokio::join!(collector.run(Duration::from_millis(10), token), canceller);

        assert!(!sink.cycles.lock().expect("poisoned").is_empty());
    }
}
