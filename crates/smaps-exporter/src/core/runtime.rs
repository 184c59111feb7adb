//! Seams to the container control plane (CRI) and the container runtime
//! (containerd tasks). The resolver only talks to these traits so it can be
//! exercised with in-memory fakes.

use core::error::Error;
use std::collections::HashMap;

use async_trait::async_trait;
use derive_more::Display;
use error_stack::Report;

pub const POD_NAMESPACE_LABEL: &str = "io.kubernetes.pod.namespace";
pub const POD_NAME_LABEL: &str = "io.kubernetes.pod.name";
pub const POD_UID_LABEL: &str = "io.kubernetes.pod.uid";
pub const CONTAINER_NAME_LABEL: &str = "io.kubernetes.container.name";

#[derive(Debug, Display)]
pub enum ControlPlaneError {
    #[display("failed to list pod sandboxes")]
    ListPodSandboxes,
    #[display("failed to list containers of pod {pod_uid}")]
    ListContainers { pod_uid: String },
}

impl Error for ControlPlaneError {}

#[derive(Debug, Display)]
pub enum RuntimeError {
    #[display("failed to load container {container_id}")]
    LoadContainer { container_id: String },
    #[display("failed to get task of container {container_id}")]
    TaskUnavailable { container_id: String },
}

impl Error for RuntimeError {}

/// A pod sandbox as reported by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodSandbox {
    pub id: String,
    pub labels: HashMap<String, String>,
}

impl PodSandbox {
    fn label(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.label(POD_NAMESPACE_LABEL)
    }

    pub fn pod_name(&self) -> &str {
        self.label(POD_NAME_LABEL)
    }

    pub fn pod_uid(&self) -> &str {
        self.label(POD_UID_LABEL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Exited,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Every pod sandbox known to the node, unfiltered.
    async fn list_pod_sandboxes(&self) -> Result<Vec<PodSandbox>, Report<ControlPlaneError>>;

    /// Containers of the pod with `pod_uid`, restricted to `container_name`
    /// when given.
    async fn list_containers(
        &self,
        pod_uid: &str,
        container_name: Option<&str>,
    ) -> Result<Vec<ContainerInfo>, Report<ControlPlaneError>>;
}

#[async_trait]
pub trait TaskRuntime: Send + Sync {
    /// Host PID of the container's init process.
    async fn init_pid(&self, container_id: &str) -> Result<u32, Report<RuntimeError>>;
}
