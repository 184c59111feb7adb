//! Application module
//!
//! Wiring and lifecycle of the exporter daemon.

pub mod builder;
pub mod core;
pub mod services;
pub mod tasks;

pub use builder::ApplicationBuilder;
pub use self::core::Application;
pub use services::ApplicationServices;
