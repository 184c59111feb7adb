//! Kubernetes CRI `RuntimeService` client.

use std::collections::HashMap;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use tonic::transport::Channel;
use tonic::Request;

use super::api::cri;
use super::api::cri::runtime_service_client::RuntimeServiceClient;
use crate::core::runtime::ContainerInfo;
use crate::core::runtime::ContainerState;
use crate::core::runtime::ControlPlane;
use crate::core::runtime::ControlPlaneError;
use crate::core::runtime::PodSandbox;
use crate::core::runtime::CONTAINER_NAME_LABEL;
use crate::core::runtime::POD_UID_LABEL;

#[derive(Debug, Clone)]
pub struct CriClient {
    client: RuntimeServiceClient<Channel>,
}

impl CriClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: RuntimeServiceClient::new(channel),
        }
    }
}

/// CRI label selector for the containers of `pod_uid`, narrowed to
/// `container_name` when given.
fn container_label_selector(pod_uid: &str, container_name: Option<&str>) -> HashMap<String, String> {
    let mut selector = HashMap::from([(POD_UID_LABEL.to_string(), pod_uid.to_string())]);
    if let Some(name) = container_name {
        selector.insert(CONTAINER_NAME_LABEL.to_string(), name.to_string());
    }
    selector
}

impl From<cri::PodSandbox> for PodSandbox {
    fn from(sandbox: cri::PodSandbox) -> Self {
        Self {
            id: sandbox.id,
            labels: sandbox.labels,
        }
    }
}

impl From<cri::ContainerState> for ContainerState {
    fn from(state: cri::ContainerState) -> Self {
        match state {
            cri::ContainerState::ContainerCreated => ContainerState::Created,
            cri::ContainerState::ContainerRunning => ContainerState::Running,
            cri::ContainerState::ContainerExited => ContainerState::Exited,
            cri::ContainerState::ContainerUnknown => ContainerState::Unknown,
        }
    }
}

impl From<cri::Container> for ContainerInfo {
    fn from(container: cri::Container) -> Self {
        let state = cri::ContainerState::try_from(container.state)
            .map(ContainerState::from)
            .unwrap_or(ContainerState::Unknown);
        let name = container
            .labels
            .get(CONTAINER_NAME_LABEL)
            .cloned()
            .or_else(|| container.metadata.map(|m| m.name))
            .unwrap_or_default();
        Self {
            id: container.id,
            name,
            state,
        }
    }
}

#[async_trait]
impl ControlPlane for CriClient {
    async fn list_pod_sandboxes(&self) -> Result<Vec<PodSandbox>, Report<ControlPlaneError>> {
        let response = self
            .client
            .clone()
            .list_pod_sandbox(Request::new(cri::ListPodSandboxRequest { filter: None }))
            .await
            .change_context(ControlPlaneError::ListPodSandboxes)?;

        Ok(response
            .into_inner()
            .items
            .into_iter()
            .map(PodSandbox::from)
            .collect())
    }

    async fn list_containers(
        &self,
        pod_uid: &str,
        container_name: Option<&str>,
    ) -> Result<Vec<ContainerInfo>, Report<ControlPlaneError>> {
        let filter = cri::ContainerFilter {
            label_selector: container_label_selector(pod_uid, container_name),
            ..Default::default()
        };

        let response = self
            .client
            .clone()
            .list_containers(Request::new(cri::ListContainersRequest {
                filter: Some(filter),
            }))
            .await
            .change_context_lazy(|| ControlPlaneError::ListContainers {
                pod_uid: pod_uid.to_string(),
            })?;

        Ok(response
            .into_inner()
            .containers
            .into_iter()
            .map(ContainerInfo::from)
            .collect())
    }
}
