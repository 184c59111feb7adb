//! HTTP endpoint exposing the metrics registry.
//!
//! # API Endpoints
//!
//! - `GET /metrics` - Prometheus text exposition of the registry
//! - `GET /healthz` - liveness probe, always `ok`
//! - `GET /` (and any other path) - redirect to `/metrics`

use core::error::Error;

pub mod handlers;
pub mod server;

pub use server::ApiServer;

/// API errors
#[derive(Debug, derive_more::Display)]
pub enum ApiError {
    #[display("Server error: {message}")]
    ServerError { message: String },
}

impl Error for ApiError {}
