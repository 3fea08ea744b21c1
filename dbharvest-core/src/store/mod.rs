//! Database access seam for the export and import engines.
//!
//! The engines only talk to a [`DataStore`]; [`PgStore`] is the PostgreSQL
//! implementation. Every operation addresses one `schema.table` and runs to
//! completion before the next one starts.

mod postgres;

pub use postgres::PgStore;

use async_trait::async_trait;

use crate::Result;
use crate::models::{Row, Table};

/// Result of a full-table read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableScan {
    /// Column names in table order; present even when `rows` is empty
    pub columns: Vec<String>,
    /// Rows in the order the server returned them
    pub rows: Vec<Row>,
}

/// A unique index as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    /// Index name
    pub name: String,
    /// Full `CREATE UNIQUE INDEX ...` statement
    pub definition: String,
}

/// Operations the engines need from a database.
///
/// # Object Safety
/// This trait is object-safe, so engines can run against
/// `&dyn DataStore` as well as a concrete store.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Reads every row of `schema.table`.
    ///
    /// # Errors
    /// Returns a query error if the table does not exist or cannot be read.
    async fn read_table(&self, schema: &str, table: &str) -> Result<TableScan>;

    /// Lists the unique indexes of `schema.table`.
    async fn unique_index_definitions(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<IndexDefinition>>;

    /// Deletes every row of `schema.table`, returning the number removed.
    async fn delete_all(&self, schema: &str, table: &str) -> Result<u64>;

    /// Bulk-loads `table` positionally into `schema.<table.name>`.
    async fn copy_rows(&self, schema: &str, table: &Table) -> Result<u64>;

    /// Inserts a JSON array of column-keyed records into `schema.table`.
    async fn insert_records(&self, schema: &str, table: &str, records_json: &str) -> Result<u64>;

    /// The column of `schema.table` backed by a sequence: a `serial` default
    /// or an identity column.
    async fn serial_column(&self, schema: &str, table: &str) -> Result<Option<String>>;

    /// Moves the sequence behind `column` to the column's current maximum.
    /// Returns the new sequence value, or `None` when the table is empty.
    async fn reset_sequence(&self, schema: &str, table: &str, column: &str) -> Result<Option<i64>>;

    /// Releases the connection.
    async fn close(&self);
}

/// Double-quotes an SQL identifier, doubling embedded quotes.
///
/// ```rust
/// use dbharvest_core::store::quote_ident;
///
/// assert_eq!(quote_ident("accounts"), r#""accounts""#);
/// assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
/// ```
pub fn quote_ident(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// `"schema"."table"`
pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}
