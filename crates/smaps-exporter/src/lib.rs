pub mod api;
pub mod app;
pub mod cmd;
pub mod config;
pub mod core;
pub mod logging;
pub mod metrics;
pub mod platform;
