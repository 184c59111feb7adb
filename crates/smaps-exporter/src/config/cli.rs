use clap::Parser;
use clap::Subcommand;
use utils::version;

use crate::config::daemon::DaemonArgs;
use crate::config::resolve::ParseSmapsArgs;
use crate::config::resolve::ResolveArgs;

/// Exports per-mapping smaps memory accounting of containerized processes
#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the exporter daemon
    Daemon(Box<DaemonArgs>),
    /// Resolve the process filter once and print the matching host PIDs
    Resolve(ResolveArgs),
    /// Parse a smaps report and print the aggregated mappings as JSON
    #[command(name = "parse-smaps")]
    ParseSmaps(ParseSmapsArgs),
}
