use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::ApiServer;
use crate::app::core::Application;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Task manager, responsible for starting and stopping the background tasks
pub struct Tasks {
    pub tasks: Vec<JoinHandle<()>>,
    cancellation_token: CancellationToken,
}

impl Default for Tasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Tasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    /// Start the collector and the API server
    pub fn spawn_all_tasks(&mut self, app: &Application) {
        let collector_task = self.spawn_collector_task(app);
        self.tasks.push(collector_task);

        let api_server_task = self.spawn_api_server_task(app);
        self.tasks.push(api_server_task);
    }

    /// Wait for a shutdown signal or for any task to exit
    pub async fn wait_for_completion(&mut self) -> Result<()> {
        let signal_handler = {
            use tokio::signal::unix::signal;
            use tokio::signal::unix::SignalKind;
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;

            tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    }
                    _ = sigint.recv() => {
                        tracing::info!("Received SIGINT, initiating graceful shutdown");
                    }
                }
            })
        };

        self.wait_for_shutdown(signal_handler).await
    }

    async fn wait_for_shutdown<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: std::future::Future + Unpin,
    {
        if self.tasks.is_empty() {
            return Ok(());
        }

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received, cancelling all tasks");
                self.cancellation_token.cancel();
                self.wait_for_tasks_with_timeout(SHUTDOWN_TIMEOUT).await;
            }
            result = futures::future::select_all(&mut self.tasks) => {
                let (result, index, remaining) = result;
                drop(remaining);
                // a finished handle must not be awaited again
                self.tasks.remove(index);
                self.cancellation_token.cancel();
                self.wait_for_tasks_with_timeout(SHUTDOWN_TIMEOUT).await;
                if let Err(e) = result {
                    tracing::error!("Task completed with error: {e}");
                    return Err(e.into());
                }
                tracing::warn!("Task completed unexpectedly");
            }
        }

        Ok(())
    }

    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            for task in &mut self.tasks {
                if let Err(e) = task.await {
                    tracing::error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        });
    }

    fn spawn_collector_task(&self, app: &Application) -> JoinHandle<()> {
        let collector = app.services().collector.clone();
        let interval = app.daemon_args().scrape_interval();
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!(
                filter = %collector.selector(),
                interval = ?interval,
                "Starting smaps collector task"
            );
            collector.run(interval, token).await;
            tracing::info!("Smaps collector task completed");
        })
    }

    fn spawn_api_server_task(&self, app: &Application) -> JoinHandle<()> {
        let registry = app.services().registry.clone();
        let listen_addr = app.daemon_args().listen_addr.clone();
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting API server on {}", listen_addr);

            let api_server = ApiServer::new(registry, listen_addr);
            if let Err(e) = api_server.run(token).await {
                tracing::error!("API server failed: {e:?}");
            } else {
                tracing::info!("API server completed");
            }
        })
    }
}
