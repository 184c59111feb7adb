//! Selector to host PID resolution.
//!
//! Resolution runs in four stages, each folding partial failures into a
//! [`StageOutcome`] instead of aborting:
//!
//! 1. pod sandboxes matching the namespace and pod name
//! 2. running containers of those pods, optionally by container name
//! 3. init process of each container, from the task runtime
//! 4. every process sharing the init process's PID namespace, optionally by
//!    `comm`

use core::error::Error;
use std::collections::BTreeSet;
use std::sync::Arc;

use derive_more::Display;
use error_stack::Report;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tracing::debug;
use tracing::warn;

use crate::core::namespace::PidNamespace;
use crate::core::runtime::ContainerState;
use crate::core::runtime::ControlPlane;
use crate::core::runtime::TaskRuntime;
use crate::core::selector::FieldMatch;
use crate::core::selector::Selector;
use crate::platform::procfs::ProcFs;

const MAX_CONCURRENT_PROBES: usize = 50;

#[derive(Debug, Display)]
pub enum ResolveError {
    #[display("control plane request failed")]
    ControlPlane,
    #[display("pod not found in sandboxes (namespace={namespace}, pod={pod})")]
    PodNotFound { namespace: String, pod: String },
    #[display("no running containers found for {selector}")]
    NoRunningContainers { selector: String },
    #[display("no processes found for {selector}")]
    NoMatchingProcesses { selector: String },
}

impl Error for ResolveError {}

/// Result of one resolution stage: what survived plus how many independent
/// lookups failed along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome<T: Ord> {
    pub items: BTreeSet<T>,
    pub failures: usize,
}

impl<T: Ord> Default for StageOutcome<T> {
    fn default() -> Self {
        Self {
            items: BTreeSet::new(),
            failures: 0,
        }
    }
}

impl<T: Ord> StageOutcome<T> {
    fn failed(&mut self) {
        self.failures += 1;
    }
}

/// Resolved PIDs plus the failures tolerated while getting there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub pids: BTreeSet<u32>,
    pub failures: usize,
}

pub struct ProcessResolver {
    control_plane: Arc<dyn ControlPlane>,
    runtime: Arc<dyn TaskRuntime>,
    procfs: ProcFs,
}

impl ProcessResolver {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        runtime: Arc<dyn TaskRuntime>,
        procfs: ProcFs,
    ) -> Self {
        Self {
            control_plane,
            runtime,
            procfs,
        }
    }

    pub fn procfs(&self) -> &ProcFs {
        &self.procfs
    }

    /// Host PIDs of every process matched by `selector`.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::ControlPlane`] if pod sandboxes cannot be listed
    /// - [`ResolveError::PodNotFound`] if no sandbox matches
    /// - [`ResolveError::NoRunningContainers`] if no matching container is running
    /// - [`ResolveError::NoMatchingProcesses`] if the namespace scan finds nothing
    pub async fn resolve(&self, selector: &Selector) -> Result<BTreeSet<u32>, Report<ResolveError>> {
        self.resolve_with_failures(selector)
            .await
            .map(|resolution| resolution.pids)
    }

    /// Same as [`Self::resolve`], also reporting how many per-pod,
    /// per-container and per-namespace lookups were skipped.
    ///
    /// # Errors
    ///
    /// See [`Self::resolve`].
    #[tracing::instrument(level = "debug", skip(self, selector), fields(selector = %selector))]
    pub async fn resolve_with_failures(
        &self,
        selector: &Selector,
    ) -> Result<Resolution, Report<ResolveError>> {
        let pods = self.matching_pods(selector).await?;
        debug!(num = pods.items.len(), "matching pod sandboxes");
        if pods.items.is_empty() {
            return Err(Report::new(ResolveError::PodNotFound {
                namespace: selector.namespace.to_string(),
                pod: selector.pod.to_string(),
            }));
        }

        let containers = self
            .running_containers(&pods.items, &selector.container)
            .await;
        debug!(num = containers.items.len(), "matching running containers");
        if containers.items.is_empty() {
            return Err(Report::new(ResolveError::NoRunningContainers {
                selector: selector.to_string(),
            }));
        }

        let init_pids = self.init_pids(&containers.items).await;
        let processes = self.scan_namespaces(&init_pids.items, &selector.comm).await;
        debug!(num = processes.items.len(), pids = ?processes.items, "matching processes");
        if processes.items.is_empty() {
            return Err(Report::new(ResolveError::NoMatchingProcesses {
                selector: selector.to_string(),
            }));
        }

        Ok(Resolution {
            pids: processes.items,
            failures: pods.failures
                + containers.failures
                + init_pids.failures
                + processes.failures,
        })
    }

    /// Pod UIDs of sandboxes whose namespace and pod name match.
    async fn matching_pods(
        &self,
        selector: &Selector,
    ) -> Result<StageOutcome<String>, Report<ResolveError>> {
        let sandboxes = self
            .control_plane
            .list_pod_sandboxes()
            .await
            .map_err(|e| e.change_context(ResolveError::ControlPlane))?;

        let items = sandboxes
            .iter()
            .filter(|sb| selector.namespace.matches(sb.namespace()))
            .filter(|sb| selector.pod.matches(sb.pod_name()))
            .map(|sb| sb.pod_uid().to_string())
            .collect();

        Ok(StageOutcome { items, failures: 0 })
    }

    /// IDs of running containers in `pod_uids`.
    async fn running_containers(
        &self,
        pod_uids: &BTreeSet<String>,
        container: &FieldMatch,
    ) -> StageOutcome<String> {
        let mut outcome = StageOutcome::default();

        for pod_uid in pod_uids {
            match self
                .control_plane
                .list_containers(pod_uid, container.literal())
                .await
            {
                Ok(containers) => outcome.items.extend(
                    containers
                        .into_iter()
                        .filter(|c| c.state == ContainerState::Running)
                        .map(|c| c.id),
                ),
                Err(e) => {
                    warn!(pod_uid = %pod_uid, error = ?e, "failed to list containers, skipping pod");
                    outcome.failed();
                }
            }
        }

        outcome
    }

    async fn init_pids(&self, container_ids: &BTreeSet<String>) -> StageOutcome<u32> {
        let mut outcome = StageOutcome::default();

        for container_id in container_ids {
            match self.runtime.init_pid(container_id).await {
                Ok(pid) => {
                    outcome.items.insert(pid);
                }
                Err(e) => {
                    warn!(container_id = %container_id, error = ?e, "failed to get init PID, skipping container");
                    outcome.failed();
                }
            }
        }

        outcome
    }

    /// Processes sharing a PID namespace with any of `init_pids`.
    async fn scan_namespaces(&self, init_pids: &BTreeSet<u32>, comm: &FieldMatch) -> StageOutcome<u32> {
        let mut outcome = StageOutcome::default();

        let mut namespaces = BTreeSet::new();
        for &init_pid in init_pids {
            match self.procfs.pid_namespace(init_pid).await {
                Ok(ns) => {
                    namespaces.insert(ns);
                }
                Err(e) => {
                    warn!(init_pid, error = ?e, "failed to get PID namespace, skipping container");
                    outcome.failed();
                }
            }
        }
        if namespaces.is_empty() {
            return outcome;
        }

        let pids = match self.procfs.pids().await {
            Ok(pids) => pids,
            Err(e) => {
                warn!(error = ?e, "failed to scan proc root");
                outcome.failed();
                return outcome;
            }
        };

        outcome
            .items
            .extend(self.scan_pids(&pids, &namespaces, comm).await);

        outcome
    }

    /// Probes every PID once, keeping those inside any of `namespaces`.
    async fn scan_pids(
        &self,
        pids: &[u32],
        namespaces: &BTreeSet<PidNamespace>,
        comm: &FieldMatch,
    ) -> Vec<u32> {
        let mut found = Vec::new();

        for chunk in pids.chunks(MAX_CONCURRENT_PROBES) {
            let mut probes: FuturesUnordered<_> = chunk
                .iter()
                .map(|&pid| self.probe(pid, namespaces, comm))
                .collect();

            while let Some(hit) = probes.next().await {
                found.extend(hit);
            }
        }

        found
    }

    async fn probe(
        &self,
        pid: u32,
        namespaces: &BTreeSet<PidNamespace>,
        comm: &FieldMatch,
    ) -> Option<u32> {
        match self.procfs.pid_namespace(pid).await {
            Ok(ns) if namespaces.contains(&ns) => {}
            Ok(_) => return None,
            Err(e) => {
                debug!(pid, error = %e, "PID namespace unreadable, excluding process");
                return None;
            }
        }
        if comm.is_wildcard() {
            return Some(pid);
        }
        match self.procfs.comm(pid).await {
            Ok(actual) if comm.matches(&actual) => Some(pid),
            Ok(_) => None,
            Err(e) => {
                debug!(pid, error = %e, "comm unreadable, excluding process");
                None
            }
        }
    }
}
