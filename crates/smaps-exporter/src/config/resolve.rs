use std::path::PathBuf;

use clap::Parser;

use crate::config::daemon::TargetArgs;

#[derive(Parser, Clone, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[arg(long, default_value = "warn", help = "Log level")]
    pub log_level: String,
}

#[derive(Parser, Clone, Debug)]
pub struct ParseSmapsArgs {
    #[arg(
        value_hint = clap::ValueHint::FilePath,
        conflicts_with = "pid",
        required_unless_present = "pid",
        help = "smaps report to parse, '-' for stdin"
    )]
    pub file: Option<PathBuf>,

    #[arg(long, help = "Read the smaps report of this PID under --proc-path")]
    pub pid: Option<u32>,

    #[arg(
        long,
        env = "SMAPS_EXPORTER_PROC_PATH",
        default_value = "/proc",
        value_hint = clap::ValueHint::DirPath,
        help = "Path where the proc filesystem is mounted"
    )]
    pub proc_path: PathBuf,

    #[arg(long, help = "Pretty-print the JSON output")]
    pub pretty: bool,
}
