use std::fs::File;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use anyhow::Result;

use crate::config::ParseSmapsArgs;
use crate::core::smaps::parse_smaps;
use crate::core::smaps::SmapsMapping;
use crate::platform::procfs::ProcFs;

/// Parses a smaps report and prints the aggregated mappings as a JSON array.
pub async fn run_parse_smaps(args: ParseSmapsArgs) -> Result<()> {
    utils::logging::init("warn");

    let mappings = read_mappings(&args).await?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&mappings)?
    } else {
        serde_json::to_string(&mappings)?
    };
    writeln!(std::io::stdout().lock(), "{json}")?;
    Ok(())
}

async fn read_mappings(args: &ParseSmapsArgs) -> Result<Vec<SmapsMapping>> {
    if let Some(pid) = args.pid {
        return ProcFs::new(args.proc_path.clone())
            .smaps(pid)
            .await
            .map_err(|e| anyhow::anyhow!("{e:?}"))
            .with_context(|| format!("failed to read smaps of pid {pid}"));
    }

    let file = args.file.as_deref().context("either a file or --pid is required")?;
    let mappings = if file == Path::new("-") {
        parse_smaps(std::io::stdin().lock())
    } else {
        let reader = File::open(file)
            .with_context(|| format!("failed to open {}", file.display()))?;
        parse_smaps(BufReader::new(reader))
    };
    mappings
        .map_err(|e| anyhow::anyhow!("{e:?}"))
        .with_context(|| format!("failed to parse {}", file.display()))
}
