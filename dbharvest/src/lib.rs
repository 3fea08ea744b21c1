//! Command-line interface for dbharvest.
//!
//! The argument types live here so they can be exercised by tests; the
//! binary in `main.rs` dispatches them to `dbharvest_core`.

use clap::{Args, Parser, Subcommand};
use dbharvest_core::{ExportReport, ImportReport};
use std::fmt::Write as _;
use std::path::PathBuf;

/// CLI argument structure
#[derive(Debug, Parser)]
#[command(name = "dbharvest")]
#[command(about = "Harvest database tables into portable bundles and load them back")]
#[command(version)]
#[command(long_about = "
dbharvest - snapshot PostgreSQL tables into portable bundles

Export reads the tables listed in a configuration file and writes them as a
raw, csv, or json bundle, optionally replacing sensitive columns with
synthetic values that still satisfy the source's unique indexes.
Import loads a bundle into another environment.

TARGET ENVIRONMENTS:
  development, staging, demo, production
    connection URL from DBHARVEST_<ENV>_DATABASE_URL or DATABASE_URL
  custom:<name>
    connection from the custom_db.<name> entry of the configuration file

Import and clean are refused on demo and production.

EXAMPLES:
  dbharvest export --target-env staging --config-file orgs.json --format csv --obscure
  dbharvest import --target-env development --bulk-file organizations-csv.zip --clean-tables
  dbharvest clean --target-env custom:local --config-file orgs.json
")]
pub struct Cli {
    /// Flags accepted by every subcommand
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Operation to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Export configured tables to a bundle file
    Export(ExportArgs),
    /// Load a bundle file into a database
    Import(ImportArgs),
    /// Delete all rows of the configured tables
    Clean(CleanArgs),
}

/// Arguments of `dbharvest export`
#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Source environment
    #[arg(long, value_name = "ENV")]
    pub target_env: String,

    /// Bundle configuration file
    #[arg(long, value_name = "FILE")]
    pub config_file: PathBuf,

    /// Bundle format; unknown values fall back to json
    #[arg(long, default_value = "json", value_name = "raw|csv|json")]
    pub format: String,

    /// Replace columns named in the configuration's obscure section
    #[arg(long)]
    pub obscure: bool,

    /// Directory the bundle is written to
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub output_dir: PathBuf,
}

/// Arguments of `dbharvest import`
#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Destination environment
    #[arg(long, value_name = "ENV")]
    pub target_env: String,

    /// Bundle to load (.raw, .json, or -csv.zip)
    #[arg(long, value_name = "FILE")]
    pub bulk_file: PathBuf,

    /// Configuration file; required for custom:<name> targets
    #[arg(long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Delete existing rows of each table before loading it
    #[arg(long)]
    pub clean_tables: bool,
}

/// Arguments of `dbharvest clean`
#[derive(Debug, Args)]
pub struct CleanArgs {
    /// Environment to clean
    #[arg(long, value_name = "ENV")]
    pub target_env: String,

    /// Bundle configuration file listing the tables
    #[arg(long, value_name = "FILE")]
    pub config_file: PathBuf,
}

/// Verbosity flags shared by all subcommands
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,
}

/// One-line-per-table summary of an export.
pub fn export_summary(report: &ExportReport) -> String {
    let mut out = String::new();
    for table in &report.tables {
        let _ = write!(out, "{}: {} rows", table.table, table.exported);
        if table.dropped > 0 {
            let _ = write!(out, " ({} dropped)", table.dropped);
        }
        out.push('\n');
    }
    if let Some(path) = &report.path {
        let _ = writeln!(out, "Wrote {} bundle to {}", report.format, path.display());
    }
    out
}

/// One-line-per-table summary of an import.
pub fn import_summary(report: &ImportReport) -> String {
    let mut out = String::new();
    for table in &report.tables {
        match &table.error {
            Some(error) => {
                let _ = writeln!(out, "{}.{}: FAILED {}", report.schema, table.table, error);
            }
            None => {
                let _ = write!(
                    out,
                    "{}.{}: {} rows",
                    report.schema,
                    table.table,
                    table.inserted.unwrap_or_default()
                );
                if let Some(sequence) = table.sequence {
                    let _ = write!(out, ", sequence at {}", sequence);
                }
                out.push('\n');
            }
        }
    }
    let failed = report.failed_tables().count();
    if failed > 0 {
        let _ = writeln!(out, "{} of {} tables failed", failed, report.tables.len());
    }
    out
}
