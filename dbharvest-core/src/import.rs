//! Import and clean engines.
//!
//! Import loads each bundle table independently: a table that fails is
//! recorded in the [`ImportReport`] and the run moves on. Clean stops at the
//! first failure.

use std::path::Path;

use serde::Serialize;

use crate::config::{BundleConfig, TargetEnvironment, resolve_database_url};
use crate::error::HarvestError;
use crate::models::{Bundle, BundleFormat, Table};
use crate::store::{DataStore, PgStore};
use crate::{Result, codec};

/// Outcome for one bundle table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableImport {
    /// Table name
    pub table: String,
    /// Rows removed before loading, when cleaning
    pub deleted: Option<u64>,
    /// Rows loaded
    pub inserted: Option<u64>,
    /// Sequence value after resync
    pub sequence: Option<i64>,
    /// Why the table failed, if it did
    pub error: Option<String>,
}

impl TableImport {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }

    /// True when the table loaded without error.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Schema the tables were loaded into
    pub schema: String,
    /// Format of the loaded bundle
    pub format: BundleFormat,
    /// Per-table outcomes in bundle order
    pub tables: Vec<TableImport>,
}

impl ImportReport {
    /// Tables that failed to load.
    pub fn failed_tables(&self) -> impl Iterator<Item = &TableImport> {
        self.tables.iter().filter(|t| !t.succeeded())
    }

    /// Rows loaded across all tables.
    pub fn inserted_rows(&self) -> u64 {
        self.tables.iter().filter_map(|t| t.inserted).sum()
    }
}

/// Picks the schema to load into: the bundle's own unless a custom target
/// supplies one through its configuration.
///
/// # Errors
/// Returns a configuration error when a custom target has no configuration.
pub fn import_schema(
    bundle: &Bundle,
    target: &TargetEnvironment,
    config: Option<&BundleConfig>,
) -> Result<String> {
    if target.custom_name().is_none() {
        return Ok(bundle.schema.clone());
    }
    config.map(|c| c.schema.clone()).ok_or_else(|| {
        HarvestError::configuration(format!("{} requires a configuration file", target))
    })
}

/// Loads every table of `bundle` into `schema`.
///
/// With `clean`, each table is emptied first; a failed delete skips that
/// table's load. Raw bundles are copied positionally. Other formats are
/// inserted as JSON records, after which the table's serial sequence is moved
/// to the loaded maximum.
pub async fn load_bundle(
    store: &dyn DataStore,
    bundle: &Bundle,
    schema: &str,
    clean: bool,
) -> ImportReport {
    let mut report = ImportReport {
        schema: schema.to_string(),
        format: bundle.format,
        tables: Vec::with_capacity(bundle.tables.len()),
    };

    for table in &bundle.tables {
        let mut outcome = TableImport::new(&table.name);
        let loaded = load_table(store, bundle.format, schema, table, clean, &mut outcome).await;
        if let Err(e) = loaded {
            tracing::warn!("Failed to import {}.{}: {}", schema, table.name, e);
            outcome.error = Some(error_chain(&e));
        }
        report.tables.push(outcome);
    }
    report
}

async fn load_table(
    store: &dyn DataStore,
    format: BundleFormat,
    schema: &str,
    table: &Table,
    clean: bool,
    outcome: &mut TableImport,
) -> Result<()> {
    if clean {
        outcome.deleted = Some(store.delete_all(schema, &table.name).await?);
    }

    if format == BundleFormat::Raw {
        let copied = store.copy_rows(schema, table).await?;
        outcome.inserted = Some(copied);
        tracing::info!("Imported {}.{} ({} rows)", schema, table.name, copied);
        return Ok(());
    }

    let records =
        serde_json::to_string(&table.records()).map_err(|e| HarvestError::Serialization {
            context: format!("Failed to serialize records of {}", table.name),
            source: e,
        })?;
    let inserted = store.insert_records(schema, &table.name, &records).await?;
    outcome.inserted = Some(inserted);
    tracing::info!("Imported {}.{} ({} rows)", schema, table.name, inserted);

    if let Some(column) = store.serial_column(schema, &table.name).await? {
        outcome.sequence = store.reset_sequence(schema, &table.name, &column).await?;
        tracing::debug!(
            "{}.{}: sequence on {} set to {:?}",
            schema,
            table.name,
            column,
            outcome.sequence
        );
    }
    Ok(())
}

fn error_chain(error: &HarvestError) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Reads and decodes the bundle at `path`.
///
/// # Errors
/// Returns an I/O error if the file cannot be read, or a codec error.
pub async fn read_bundle(path: &Path) -> Result<Bundle> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| HarvestError::io(format!("Failed to read {}", path.display()), e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    codec::decode(&bytes, &name)
}

/// Imports the bundle at `bundle_path` into the `target_env` database.
///
/// `config_path` is required for custom targets, which take their schema
/// and connection from it.
///
/// # Errors
/// Configuration, decode, and connection errors are fatal. Per-table failures
/// are reported in the returned [`ImportReport`].
pub async fn run_import(
    target_env: &str,
    config_path: Option<&Path>,
    bundle_path: &Path,
    clean: bool,
) -> Result<ImportReport> {
    let target: TargetEnvironment = target_env.parse()?;
    target.ensure_writable("Import")?;

    let config = match (target.custom_name(), config_path) {
        (Some(_), Some(path)) => Some(BundleConfig::load(path)?),
        (Some(_), None) => {
            return Err(HarvestError::configuration(format!(
                "{} requires --config-file",
                target
            )));
        }
        (None, _) => None,
    };

    let bundle = read_bundle(bundle_path).await?;
    let schema = import_schema(&bundle, &target, config.as_ref())?;
    tracing::info!(
        "Importing {} ({} bundle from {}, {} rows) into {} schema {}",
        bundle_path.display(),
        bundle.format,
        bundle.environment,
        bundle.row_count(),
        target,
        schema
    );

    let settings = resolve_database_url(&target, config.as_ref())?;
    let store = PgStore::connect(&settings).await?;
    let report = load_bundle(&store, &bundle, &schema, clean).await;
    store.close().await;
    tracing::info!(
        "Loaded {} rows into {} of {} tables",
        report.inserted_rows(),
        report.tables.len() - report.failed_tables().count(),
        report.tables.len()
    );
    Ok(report)
}

/// Deletes every row of `tables`, in order.
///
/// # Errors
/// Returns the first failed delete; later tables are left untouched.
pub async fn clean_tables(
    store: &dyn DataStore,
    schema: &str,
    tables: &[String],
) -> Result<Vec<(String, u64)>> {
    let mut deleted = Vec::with_capacity(tables.len());
    for table in tables {
        let rows = store.delete_all(schema, table).await?;
        tracing::info!("Cleaned {}.{} ({} rows)", schema, table, rows);
        deleted.push((table.clone(), rows));
    }
    Ok(deleted)
}

/// Empties every table named in the configuration at `config_path`.
///
/// # Errors
/// Any error is fatal, including refusal on protected environments.
pub async fn run_clean(target_env: &str, config_path: &Path) -> Result<Vec<(String, u64)>> {
    let target: TargetEnvironment = target_env.parse()?;
    target.ensure_writable("Clean")?;
    let config = BundleConfig::load(config_path)?;

    let settings = resolve_database_url(&target, Some(&config))?;
    let store = PgStore::connect(&settings).await?;
    let result = clean_tables(&store, &config.schema, &config.tables).await;
    store.close().await;
    result
}
