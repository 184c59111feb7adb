use anyhow::Result;
use clap::Parser;
use smaps_exporter::cmd;
use smaps_exporter::config::Cli;
use smaps_exporter::config::Commands;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon(daemon_args) => cmd::run_daemon(*daemon_args).await,
        Commands::Resolve(resolve_args) => cmd::run_resolve(resolve_args).await,
        Commands::ParseSmaps(parse_smaps_args) => cmd::run_parse_smaps(parse_smaps_args).await,
    }
}
