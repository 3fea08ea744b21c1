//! dbharvest binary.
//!
//! Fatal errors exit non-zero with the full error chain. Per-table import
//! failures are reported but do not change the exit status.

use anyhow::Context;
use clap::Parser;
use dbharvest::{CleanArgs, Cli, Command, ExportArgs, ImportArgs, export_summary, import_summary};
use dbharvest_core::logging::init_logging;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    match cli.command {
        Command::Export(args) => export(args).await,
        Command::Import(args) => import(args).await,
        Command::Clean(args) => clean(args).await,
    }
}

async fn export(args: ExportArgs) -> anyhow::Result<()> {
    let mut rng = StdRng::from_os_rng();
    let report = dbharvest_core::run_export(
        &args.target_env,
        &args.config_file,
        &args.format,
        args.obscure,
        &args.output_dir,
        &mut rng,
    )
    .await
    .with_context(|| format!("Export from {} failed", args.target_env))?;

    print!("{}", export_summary(&report));
    Ok(())
}

async fn import(args: ImportArgs) -> anyhow::Result<()> {
    let report = dbharvest_core::run_import(
        &args.target_env,
        args.config_file.as_deref(),
        &args.bulk_file,
        args.clean_tables,
    )
    .await
    .with_context(|| format!("Import of {} failed", args.bulk_file.display()))?;

    print!("{}", import_summary(&report));
    Ok(())
}

async fn clean(args: CleanArgs) -> anyhow::Result<()> {
    let deleted = dbharvest_core::run_clean(&args.target_env, &args.config_file)
        .await
        .with_context(|| format!("Clean of {} failed", args.target_env))?;

    for (table, rows) in &deleted {
        println!("{}: {} rows deleted", table, rows);
    }
    info!("Cleaned {} tables", deleted.len());
    Ok(())
}
