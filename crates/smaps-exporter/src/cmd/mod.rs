//! Command layer - entry points of the exporter subcommands

pub mod daemon;
pub mod resolve;
pub mod smaps;

pub use daemon::run_daemon;
pub use resolve::run_resolve;
pub use smaps::run_parse_smaps;
