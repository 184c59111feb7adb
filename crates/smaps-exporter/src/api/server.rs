use std::sync::Arc;

use error_stack::Report;
use poem::get;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::Endpoint;
use poem::EndpointExt;
use poem::Route;
use poem::Server;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::handlers::healthz;
use super::handlers::index;
use super::handlers::metrics;
use super::ApiError;
use crate::metrics::PrometheusSink;

/// HTTP server exposing the metrics registry
pub struct ApiServer {
    registry: Arc<PrometheusSink>,
    listen_addr: String,
}

pub fn routes(registry: Arc<PrometheusSink>) -> impl Endpoint {
    Route::new()
        .at("/metrics", get(metrics))
        .at("/healthz", get(healthz))
        .at("/", get(index))
        .at("/*path", get(index))
        .data(registry)
        .with(Tracing)
}

impl ApiServer {
    pub fn new(registry: Arc<PrometheusSink>, listen_addr: String) -> Self {
        Self {
            registry,
            listen_addr,
        }
    }

    /// Serve until `token` is cancelled.
    ///
    /// # Errors
    ///
    /// - [`ApiError::ServerError`] if the server fails to start or bind to the address
    pub async fn run(self, token: CancellationToken) -> Result<(), Report<ApiError>> {
        info!("Starting HTTP server on {}", self.listen_addr);

        let app = routes(self.registry);
        let listener = TcpListener::bind(&self.listen_addr);
        let server = Server::new(listener);

        tokio::select! {
            result = server.run(app) => {
                match result {
                    Ok(()) => {
                        info!("HTTP server stopped normally");
                        Ok(())
                    }
                    Err(e) => {
                        error!("HTTP server failed: {e}");
                        Err(Report::new(ApiError::ServerError {
                            message: format!("Server failed: {e}"),
                        }))
                    }
                }
            }
            _ = token.cancelled() => {
                info!("HTTP server shutdown requested");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use poem::http::StatusCode;
    use poem::test::TestClient;
    use test_log::test;

    use super::*;
    use crate::core::smaps::SmapsMapping;
    use crate::metrics::MetricsSink;

    fn registry() -> Arc<PrometheusSink> {
        Arc::new(PrometheusSink::new().expect("fresh registry"))
    }

    #[test(tokio::test)]
    async fn metrics_endpoint_serves_registry() {
        let registry = registry();
        let mut mapping = SmapsMapping::new("[heap]");
        mapping.rss = 65536;
        registry.record_mapping("redis-server", &mapping);
        let cli = TestClient::new(routes(registry));

        let resp = cli.get("/metrics").send().await;

        resp.assert_status_is_ok();
        let body = resp.0.into_body().into_string().await.expect("utf-8 body");
        assert!(body.contains(r#"process_smaps_rss_bytes{comm="redis-server",path="[heap]"} 65536"#));
    }

    #[test(tokio::test)]
    async fn root_redirects_to_metrics() {
        let cli = TestClient::new(routes(registry()));

        for path in ["/", "/anything/else"] {
            let resp = cli.get(path).send().await;
            resp.assert_status(StatusCode::FOUND);
            resp.assert_header("location", "/metrics");
        }
    }

    #[test(tokio::test)]
    async fn healthz_reports_ok() {
        let cli = TestClient::new(routes(registry()));

        let resp = cli.get("/healthz").send().await;

        resp.assert_status_is_ok();
        resp.assert_text("ok").await;
    }

    #[test(tokio::test)]
    async fn run_returns_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        let server = ApiServer::new(registry(), "127.0.0.1:0".to_string());

        assert!(server.run(token).await.is_ok());
    }
}
