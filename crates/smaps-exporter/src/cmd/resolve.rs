use std::io::Write;

use anyhow::Context;
use anyhow::Result;

use crate::app::builder::build_resolver;
use crate::config::ResolveArgs;

/// Resolves the filter once and prints one host PID per line.
pub async fn run_resolve(args: ResolveArgs) -> Result<()> {
    utils::logging::init(&args.log_level);

    let resolver = build_resolver(&args.target).await?;
    let pids = resolver
        .resolve(&args.target.filter)
        .await
        .map_err(|e| anyhow::anyhow!("{e:?}"))
        .with_context(|| format!("failed to resolve {}", args.target.filter))?;

    let mut stdout = std::io::stdout().lock();
    for pid in pids {
        writeln!(stdout, "{pid}")?;
    }
    Ok(())
}
