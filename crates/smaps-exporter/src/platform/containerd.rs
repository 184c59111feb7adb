//! containerd client resolving a container's init process.
//!
//! containerd scopes every object by namespace; kubelet-managed containers
//! live in `k8s.io`. The namespace travels as gRPC metadata on each call.

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use tonic::metadata::AsciiMetadataValue;
use tonic::transport::Channel;
use tonic::Request;

use super::api::containers;
use super::api::containers::containers_client::ContainersClient;
use super::api::tasks;
use super::api::tasks::tasks_client::TasksClient;
use super::grpc::ConnectError;
use crate::core::runtime::RuntimeError;
use crate::core::runtime::TaskRuntime;

pub const DEFAULT_NAMESPACE: &str = "k8s.io";
const NAMESPACE_HEADER: &str = "containerd-namespace";

#[derive(Debug, Clone)]
pub struct ContainerdClient {
    containers: ContainersClient<Channel>,
    tasks: TasksClient<Channel>,
    namespace: AsciiMetadataValue,
}

impl ContainerdClient {
    /// # Errors
    ///
    /// - [`ConnectError::InvalidNamespace`] if `namespace` cannot be sent as metadata
    pub fn new(channel: Channel, namespace: &str) -> Result<Self, Report<ConnectError>> {
        let namespace = namespace
            .parse::<AsciiMetadataValue>()
            .change_context_lazy(|| ConnectError::InvalidNamespace {
                namespace: namespace.to_string(),
            })?;

        Ok(Self {
            containers: ContainersClient::new(channel.clone()),
            tasks: TasksClient::new(channel),
            namespace,
        })
    }

    fn namespaced<T>(&self, message: T) -> Request<T> {
        let mut request = Request::new(message);
        request
            .metadata_mut()
            .insert(NAMESPACE_HEADER, self.namespace.clone());
        request
    }
}

#[async_trait]
impl TaskRuntime for ContainerdClient {
    async fn init_pid(&self, container_id: &str) -> Result<u32, Report<RuntimeError>> {
        self.containers
            .clone()
            .get(self.namespaced(containers::GetContainerRequest {
                id: container_id.to_string(),
            }))
            .await
            .change_context_lazy(|| RuntimeError::LoadContainer {
                container_id: container_id.to_string(),
            })?;

        let task_unavailable = || RuntimeError::TaskUnavailable {
            container_id: container_id.to_string(),
        };

        let process = self
            .tasks
            .clone()
            .get(self.namespaced(tasks::GetRequest {
                container_id: container_id.to_string(),
                exec_id: String::new(),
            }))
            .await
            .change_context_lazy(task_unavailable)?
            .into_inner()
            .process
            .ok_or_else(|| Report::new(task_unavailable()))
            .attach_printable("task has no process")?;

        if process.pid == 0 {
            return Err(Report::new(task_unavailable()))
                .attach_printable(format!("task status {:?}", process.status()));
        }

        Ok(process.pid)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;
    use tonic::transport::Endpoint;

    use super::*;

    fn lazy_channel() -> Channel {
        Endpoint::from_static("http://tonic").connect_lazy()
    }

    #[test(tokio::test)]
    async fn namespace_is_attached_to_requests() {
        let client = ContainerdClient::new(lazy_channel(), DEFAULT_NAMESPACE).expect("valid namespace");

        let request = client.namespaced(());

        assert_eq!(
            request.metadata().get(NAMESPACE_HEADER).map(|v| v.to_str().ok()),
            Some(Some(DEFAULT_NAMESPACE))
        );
    }

    #[test(tokio::test)]
    async fn rejects_namespace_that_is_not_valid_metadata() {
        let err = ContainerdClient::new(lazy_channel(), "bad\nnamespace").expect_err("newline");

        assert!(matches!(
            err.current_context(),
            ConnectError::InvalidNamespace { .. }
        ));
    }
}
