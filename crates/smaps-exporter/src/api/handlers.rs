use std::sync::Arc;

use poem::handler;
use poem::http::header;
use poem::http::StatusCode;
use poem::web::Data;
use poem::Response;
use tracing::error;

use crate::metrics::PrometheusSink;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus text exposition of every registered metric
#[handler]
pub async fn metrics(registry: Data<&Arc<PrometheusSink>>) -> Response {
    match registry.gather_text() {
        Ok(body) => Response::builder().content_type(TEXT_FORMAT).body(body),
        Err(e) => {
            error!(error = ?e, "failed to encode metrics");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(e.to_string())
        }
    }
}

#[handler]
pub async fn healthz() -> &'static str {
    "ok"
}

#[handler]
pub async fn index() -> Response {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, "/metrics")
        .finish()
}
