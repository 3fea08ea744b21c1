//! Core engine for dbharvest.
//!
//! dbharvest snapshots a configured group of PostgreSQL tables into a
//! portable bundle, optionally replacing sensitive columns with synthetic
//! values, and loads such bundles back into another database.
//!
//! # Guarantees
//! - An export either writes a complete bundle or nothing
//! - Obscured rows never break the unique indexes of the source table; a row
//!   that cannot be made unique within the retry budget is dropped and counted
//! - An import keeps going when one table fails and reports each table
//! - Credentials never appear in logs or error messages
//!
//! # Architecture
//! - [`store::DataStore`] abstracts the database so engines can be tested
//!   against an in-memory store
//! - [`obscure`] holds the pattern language and the uniqueness guard
//! - [`codec`] owns the raw, json, and csv wire formats
//! - [`export`] and [`import`] orchestrate the above
//!
//! All randomness flows through a caller-supplied [`rand::Rng`], so seeded
//! generators make every probabilistic behavior reproducible.

pub mod codec;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod logging;
pub mod models;
pub mod obscure;
pub mod store;

// Re-export commonly used types
pub use config::{BundleConfig, ConnectionSettings, CustomConnection, TargetEnvironment};
pub use error::{HarvestError, Result};
pub use export::{ExportReport, ExportRequest, TableExport, export_bundle, harvest, run_export};
pub use import::{ImportReport, TableImport, clean_tables, load_bundle, run_clean, run_import};
pub use models::{Bundle, BundleFormat, ObscurePolicy, Row, Table, Value};
pub use store::{DataStore, IndexDefinition, PgStore, TableScan};
