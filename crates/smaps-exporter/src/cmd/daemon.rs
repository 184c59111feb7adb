use anyhow::Result;
use utils::version;

use crate::app::ApplicationBuilder;
use crate::config::DaemonArgs;
use crate::logging;

pub async fn run_daemon(daemon_args: DaemonArgs) -> Result<()> {
    let _guard = logging::init(&daemon_args.log_level, daemon_args.metrics_output())?;

    tracing::info!("Starting smaps exporter daemon {}", &**version::VERSION);
    tracing::info!(
        filter = %daemon_args.target.filter,
        format = ?daemon_args.metrics_format,
        listen_addr = %daemon_args.listen_addr,
        "exporter configuration"
    );

    let app = ApplicationBuilder::new(daemon_args).build().await?;
    app.run().await?;

    tracing::info!("Smaps exporter daemon stopped");
    Ok(())
}
