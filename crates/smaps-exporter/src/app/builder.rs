use std::sync::Arc;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;

use crate::app::Application;
use crate::app::ApplicationServices;
use crate::config::DaemonArgs;
use crate::config::TargetArgs;
use crate::core::collector::SmapsCollector;
use crate::core::resolver::ProcessResolver;
use crate::metrics::create_sink;
use crate::metrics::PrometheusSink;
use crate::platform::containerd::ContainerdClient;
use crate::platform::cri::CriClient;
use crate::platform::grpc::connect_uds;
use crate::platform::procfs::ProcFs;

/// Application builder
pub struct ApplicationBuilder {
    daemon_args: DaemonArgs,
}

impl ApplicationBuilder {
    pub fn new(daemon_args: DaemonArgs) -> Self {
        Self { daemon_args }
    }

    /// Build complete application
    pub async fn build(self) -> Result<Application> {
        tracing::info!("Building application components...");

        let resolver = build_resolver(&self.daemon_args.target).await?;

        let registry = Arc::new(
            PrometheusSink::new()
                .map_err(|e| anyhow::anyhow!("{e:?}"))
                .context("failed to create metrics registry")?,
        );
        let sink = create_sink(self.daemon_args.metrics_format, registry.clone());

        let collector = Arc::new(SmapsCollector::new(
            resolver,
            self.daemon_args.target.filter.clone(),
            sink,
        ));

        let services = ApplicationServices {
            collector,
            registry,
        };
        Ok(Application::new(services, self.daemon_args))
    }
}

/// Validates the host paths and connects the CRI and containerd clients over
/// the shared socket.
pub async fn build_resolver(target: &TargetArgs) -> Result<ProcessResolver> {
    if !target.proc_path.is_dir() {
        bail!(
            "proc path {} does not exist or is not a directory",
            target.proc_path.display()
        );
    }
    if !target.containerd_socket.exists() {
        bail!(
            "containerd socket {} does not exist",
            target.containerd_socket.display()
        );
    }

    let channel = connect_uds(&target.containerd_socket)
        .await
        .map_err(|e| anyhow::anyhow!("{e:?}"))
        .context("failed to connect to containerd")?;
    tracing::info!(
        socket = %target.containerd_socket.display(),
        namespace = %target.containerd_namespace,
        "connected to containerd"
    );

    let control_plane = CriClient::new(channel.clone());
    let runtime = ContainerdClient::new(channel, &target.containerd_namespace)
        .map_err(|e| anyhow::anyhow!("{e:?}"))
        .context("failed to create containerd client")?;

    Ok(ProcessResolver::new(
        Arc::new(control_plane),
        Arc::new(runtime),
        ProcFs::new(target.proc_path.clone()),
    ))
}
