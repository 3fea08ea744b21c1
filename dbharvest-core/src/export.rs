//! Export engine.
//!
//! Reads every configured table, obscures policy-targeted columns while
//! keeping unique indexes intact, and writes the finished bundle in one piece.
//! Any table failure aborts the export before a file is written.

use std::path::{Path, PathBuf};

use rand::Rng;
use serde::Serialize;

use crate::config::{BundleConfig, TargetEnvironment, resolve_database_url};
use crate::error::HarvestError;
use crate::models::{Bundle, BundleFormat, Table};
use crate::obscure::{RowOutcome, TableObscurer, UniqueGuard, UniqueIndex, unique_index_columns};
use crate::store::{DataStore, PgStore};
use crate::{Result, codec};

/// What to export and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    /// Environment to read from
    pub target: TargetEnvironment,
    /// Bundle format to write
    pub format: BundleFormat,
    /// Apply the configured obscuring policies
    pub obscure: bool,
}

/// Row counts for one exported table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableExport {
    /// Table name
    pub table: String,
    /// Rows written to the bundle
    pub exported: usize,
    /// Rows left out because obscuring could not make them unique
    pub dropped: usize,
}

/// Outcome of an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    /// Written bundle; `None` until the bundle is on disk
    pub path: Option<PathBuf>,
    /// Format the bundle was written in
    pub format: BundleFormat,
    /// Per-table counts in configuration order
    pub tables: Vec<TableExport>,
}

impl ExportReport {
    /// Rows written across all tables.
    pub fn exported_rows(&self) -> usize {
        self.tables.iter().map(|t| t.exported).sum()
    }

    /// Rows dropped across all tables.
    pub fn dropped_rows(&self) -> usize {
        self.tables.iter().map(|t| t.dropped).sum()
    }
}

/// Builds the in-memory bundle for `config` from `store`.
///
/// Tables are read in configuration order. When `request.obscure` is set and
/// a table has a policy, its unique indexes are discovered first and every
/// row is obscured under them.
///
/// # Errors
/// Returns the first read, index discovery, or row-shape error. No partial
/// bundle is returned.
pub async fn harvest<R>(
    store: &dyn DataStore,
    config: &BundleConfig,
    request: &ExportRequest,
    rng: &mut R,
) -> Result<(Bundle, ExportReport)>
where
    R: Rng + ?Sized,
{
    let mut bundle = Bundle::new(request.format, request.target.label(), config.schema.clone());
    let mut report = ExportReport {
        path: None,
        format: request.format,
        tables: Vec::with_capacity(config.tables.len()),
    };

    for name in &config.tables {
        let scan = store.read_table(&config.schema, name).await?;
        let label = format!("{}.{}", config.schema, name);
        let mut table = Table::new(name.clone(), scan.columns);
        let mut counts = TableExport {
            table: name.clone(),
            ..TableExport::default()
        };

        let policy = if request.obscure { config.policy_for(name) } else { None };
        if let Some(policy) = policy {
            let guard = discover_guard(store, &config.schema, name, &table.columns).await?;
            let mut obscurer = TableObscurer::new(label.as_str(), &table.columns, policy, guard);
            for row in &scan.rows {
                match obscurer.obscure_row(row, rng) {
                    RowOutcome::Accepted { row, .. } => {
                        table.push_row(row)?;
                        counts.exported += 1;
                    }
                    RowOutcome::Dropped { attempts } => {
                        tracing::debug!(
                            "{}: dropping row after {} duplicate attempts",
                            label,
                            attempts
                        );
                        counts.dropped += 1;
                    }
                }
            }
        } else {
            for row in scan.rows {
                table.push_row(row)?;
                counts.exported += 1;
            }
        }

        if counts.dropped > 0 {
            tracing::warn!(
                "{}: {} rows dropped to keep unique indexes intact",
                label,
                counts.dropped
            );
        }
        tracing::info!("Exported {} ({} rows)", label, counts.exported);
        bundle.tables.push(table);
        report.tables.push(counts);
    }

    Ok((bundle, report))
}

async fn discover_guard(
    store: &dyn DataStore,
    schema: &str,
    table: &str,
    columns: &[String],
) -> Result<UniqueGuard> {
    let definitions = store.unique_index_definitions(schema, table).await?;
    let indexes = definitions
        .iter()
        .filter_map(|def| {
            let members = unique_index_columns(&def.definition)?;
            let index = UniqueIndex::resolve(def.name.as_str(), &members, columns);
            if index.members.len() < members.len() {
                tracing::debug!(
                    "{}.{}: index {} has members outside the column list",
                    schema,
                    table,
                    def.name
                );
            }
            Some(index)
        })
        .collect();
    Ok(UniqueGuard::new(indexes))
}

/// Harvests, releases the store, then encodes and writes the bundle to
/// `output_dir`.
///
/// The file is first written under a temporary name and renamed into place,
/// so a failed export never leaves a bundle behind.
///
/// # Errors
/// Returns any harvest, encode, or write error.
pub async fn export_bundle<R>(
    store: &dyn DataStore,
    config: &BundleConfig,
    request: &ExportRequest,
    output_dir: &Path,
    rng: &mut R,
) -> Result<ExportReport>
where
    R: Rng + ?Sized,
{
    let harvested = harvest(store, config, request, rng).await;
    store.close().await;
    let (bundle, mut report) = harvested?;

    let bytes = codec::encode(&bundle)?;
    let file_name = request.format.file_name(&config.table_group_name);
    let path = output_dir.join(&file_name);
    let partial = output_dir.join(format!("{}.partial", file_name));
    tokio::fs::write(&partial, &bytes)
        .await
        .map_err(|e| HarvestError::io(format!("Failed to write {}", partial.display()), e))?;
    tokio::fs::rename(&partial, &path)
        .await
        .map_err(|e| HarvestError::io(format!("Failed to move bundle to {}", path.display()), e))?;

    tracing::info!(
        "Wrote {} ({} rows, {} dropped)",
        path.display(),
        report.exported_rows(),
        report.dropped_rows()
    );
    report.path = Some(path);
    Ok(report)
}

/// Exports the tables of the configuration at `config_path` from the
/// `target_env` database into `output_dir`.
///
/// `format_label` is parsed leniently: anything but `raw` or `csv` is json.
///
/// # Errors
/// Configuration and connection errors are returned before any table is
/// read; see [`export_bundle`] for the rest.
pub async fn run_export<R>(
    target_env: &str,
    config_path: &Path,
    format_label: &str,
    obscure: bool,
    output_dir: &Path,
    rng: &mut R,
) -> Result<ExportReport>
where
    R: Rng + ?Sized,
{
    let target: TargetEnvironment = target_env.parse()?;
    let config = BundleConfig::load(config_path)?;
    let request = ExportRequest {
        target,
        format: BundleFormat::from_label(format_label),
        obscure,
    };
    tracing::info!(
        "Exporting '{}' from {} as {}",
        config.table_group_name,
        request.target,
        request.format
    );

    let settings = resolve_database_url(&request.target, Some(&config))?;
    let store = PgStore::connect(&settings).await?;
    export_bundle(&store, &config, &request, output_dir, rng).await
}
