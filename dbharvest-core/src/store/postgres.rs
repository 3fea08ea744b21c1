//! PostgreSQL implementation of [`DataStore`].
//!
//! Column values are decoded according to the column's catalog type. Types
//! without a dedicated [`Value`] variant are read through a `::text` cast, so
//! any table can be harvested without extra driver features.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolCopyExt, PgPoolOptions, PgRow};
use sqlx::{Executor, Row as _};

use super::{DataStore, IndexDefinition, TableScan, qualified_name, quote_ident};
use crate::config::ConnectionSettings;
use crate::error::HarvestError;
use crate::models::{Row, Table, Value};
use crate::Result;

/// How a column is read and decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Date,
    Timestamp,
    TimestampTz,
    Json,
    Text,
}

impl ColumnKind {
    /// Maps an `information_schema.columns.udt_name`.
    pub(crate) fn from_udt(udt_name: &str) -> Self {
        match udt_name {
            "bool" => Self::Bool,
            "int2" => Self::Int2,
            "int4" => Self::Int4,
            "int8" => Self::Int8,
            "float4" => Self::Float4,
            "float8" => Self::Float8,
            "date" => Self::Date,
            "timestamp" => Self::Timestamp,
            "timestamptz" => Self::TimestampTz,
            "json" | "jsonb" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Select-list expression for a column of this kind.
    pub(crate) fn select_expr(self, column: &str) -> String {
        match self {
            Self::Json | Self::Text => format!("{}::text", quote_ident(column)),
            _ => quote_ident(column),
        }
    }

    fn decode(self, row: &PgRow, index: usize) -> std::result::Result<Value, sqlx::Error> {
        let value: Value = match self {
            Self::Bool => row.try_get::<Option<bool>, _>(index)?.into(),
            Self::Int2 => row
                .try_get::<Option<i16>, _>(index)?
                .map_or(Value::Null, |v| Value::Int(i64::from(v))),
            Self::Int4 => row
                .try_get::<Option<i32>, _>(index)?
                .map_or(Value::Null, |v| Value::Int(i64::from(v))),
            Self::Int8 => row.try_get::<Option<i64>, _>(index)?.into(),
            Self::Float4 => row
                .try_get::<Option<f32>, _>(index)?
                .map_or(Value::Null, |v| Value::Float(f64::from(v))),
            Self::Float8 => row
                .try_get::<Option<f64>, _>(index)?
                .map_or(Value::Null, Value::Float),
            Self::Date => row
                .try_get::<Option<NaiveDate>, _>(index)?
                .map_or(Value::Null, Value::Date),
            Self::Timestamp => row
                .try_get::<Option<NaiveDateTime>, _>(index)?
                .map_or(Value::Null, Value::Timestamp),
            Self::TimestampTz => row
                .try_get::<Option<DateTime<Utc>>, _>(index)?
                .map_or(Value::Null, Value::TimestampTz),
            Self::Json => match row.try_get::<Option<String>, _>(index)? {
                Some(text) => {
                    let parsed = serde_json::from_str(&text).map_err(|e| {
                        sqlx::Error::ColumnDecode {
                            index: index.to_string(),
                            source: Box::new(e),
                        }
                    })?;
                    Value::Json(parsed)
                }
                None => Value::Null,
            },
            Self::Text => row.try_get::<Option<String>, _>(index)?.into(),
        };
        Ok(value)
    }
}

/// Renders rows in the text format of `COPY ... FROM STDIN`.
pub(crate) fn copy_text(rows: &[Row]) -> String {
    let mut out = String::new();
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                out.push('\t');
            }
            push_copy_field(&mut out, value);
        }
        out.push('\n');
    }
    out
}

fn push_copy_field(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("\\N"),
        Value::Bool(b) => out.push(if *b { 't' } else { 'f' }),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) if f.is_nan() => out.push_str("NaN"),
        Value::Float(f) if f.is_infinite() => {
            out.push_str(if *f > 0.0 { "Infinity" } else { "-Infinity" });
        }
        Value::Float(f) => out.push_str(&f.to_string()),
        Value::Text(s) => push_escaped(out, s),
        Value::Date(d) => out.push_str(&d.format("%Y-%m-%d").to_string()),
        Value::Timestamp(ts) => {
            out.push_str(&ts.format("%Y-%m-%d %H:%M:%S%.f").to_string());
        }
        Value::TimestampTz(ts) => {
            out.push_str(&ts.format("%Y-%m-%d %H:%M:%S%.f+00").to_string());
        }
        Value::Json(v) => push_escaped(out, &v.to_string()),
    }
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
}

/// Set-based insert of a JSON record array bound as `$1`.
///
/// Values supplied for identity columns win over generated ones, so bundles
/// keep their ids even for `GENERATED ALWAYS` columns.
pub(crate) fn insert_records_sql(schema: &str, table: &str) -> String {
    let target = qualified_name(schema, table);
    format!(
        "INSERT INTO {} OVERRIDING SYSTEM VALUE \
         SELECT * FROM json_populate_recordset(NULL::{}, $1::json)",
        target, target
    )
}

/// [`DataStore`] backed by a small PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Opens the pool and verifies the connection.
    ///
    /// Every pooled connection runs with `timezone = 'UTC'`.
    ///
    /// # Errors
    /// Returns a connection error (URL redacted) if the database cannot be
    /// reached.
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        tracing::debug!("Connecting to {}", settings);
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections.max(1))
            .acquire_timeout(settings.connect_timeout)
            .test_before_acquire(true)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET timezone = 'UTC'").await?;
                    let application_name =
                        format!("SET application_name = 'dbharvest-{}'", env!("CARGO_PKG_VERSION"));
                    conn.execute(application_name.as_str()).await?;
                    Ok(())
                })
            })
            .connect(settings.url())
            .await
            .map_err(|e| HarvestError::connection_failed(settings.url(), e))?;

        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn column_kinds(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<(String, ColumnKind)>> {
        let rows = sqlx::query(
            r#"
            SELECT column_name::text AS column_name, udt_name::text AS udt_name
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            HarvestError::query_failed(format!("Failed to list columns of {}.{}", schema, table), e)
        })?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("column_name")?;
                let udt: String = row.try_get("udt_name")?;
                Ok((name, ColumnKind::from_udt(&udt)))
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| {
                let context = format!("Failed to decode columns of {}.{}", schema, table);
                HarvestError::query_failed(context, e)
            })
    }
}

#[async_trait]
impl DataStore for PgStore {
    async fn read_table(&self, schema: &str, table: &str) -> Result<TableScan> {
        let layout = self.column_kinds(schema, table).await?;
        if layout.is_empty() {
            return Err(HarvestError::Query {
                context: format!("Table {}.{} not found", schema, table),
                source: "no columns in information_schema".into(),
            });
        }

        let select_list: Vec<String> =
            layout.iter().map(|(name, kind)| kind.select_expr(name)).collect();
        let sql = format!(
            "SELECT {} FROM {}",
            select_list.join(", "),
            qualified_name(schema, table)
        );
        let records = sqlx::query(&sql).fetch_all(&self.pool).await.map_err(|e| {
            HarvestError::query_failed(format!("Failed to read {}.{}", schema, table), e)
        })?;

        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            let row = layout
                .iter()
                .enumerate()
                .map(|(i, (_, kind))| kind.decode(record, i))
                .collect::<std::result::Result<Row, _>>()
                .map_err(|e| {
                    let context = format!("Failed to decode a row of {}.{}", schema, table);
                    HarvestError::query_failed(context, e)
                })?;
            rows.push(row);
        }

        Ok(TableScan {
            columns: layout.into_iter().map(|(name, _)| name).collect(),
            rows,
        })
    }

    async fn unique_index_definitions(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<IndexDefinition>> {
        let rows = sqlx::query(
            r#"
            SELECT indexname::text AS name, indexdef AS definition
            FROM pg_indexes
            WHERE schemaname = $1 AND tablename = $2
              AND indexdef LIKE 'CREATE UNIQUE INDEX%'
            ORDER BY indexname
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            let context = format!("Failed to list unique indexes of {}.{}", schema, table);
            HarvestError::query_failed(context, e)
        })?;

        rows.iter()
            .map(|row| {
                Ok(IndexDefinition {
                    name: row.try_get("name")?,
                    definition: row.try_get("definition")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| {
                let context = format!("Failed to decode indexes of {}.{}", schema, table);
                HarvestError::query_failed(context, e)
            })
    }

    async fn delete_all(&self, schema: &str, table: &str) -> Result<u64> {
        let sql = format!("DELETE FROM {}", qualified_name(schema, table));
        let result = sqlx::query(&sql).execute(&self.pool).await.map_err(|e| {
            HarvestError::query_failed(format!("Failed to delete from {}.{}", schema, table), e)
        })?;
        Ok(result.rows_affected())
    }

    async fn copy_rows(&self, schema: &str, table: &Table) -> Result<u64> {
        if table.rows.is_empty() {
            return Ok(0);
        }
        let columns: Vec<String> = table.columns.iter().map(|c| quote_ident(c)).collect();
        let statement = format!(
            "COPY {} ({}) FROM STDIN",
            qualified_name(schema, &table.name),
            columns.join(", ")
        );
        let context = || format!("Failed to copy rows into {}.{}", schema, table.name);

        let mut copy = self
            .pool
            .copy_in_raw(&statement)
            .await
            .map_err(|e| HarvestError::query_failed(context(), e))?;
        if let Err(e) = copy.send(copy_text(&table.rows).into_bytes()).await {
            let _ = copy.abort(e.to_string()).await;
            return Err(HarvestError::query_failed(context(), e));
        }
        copy.finish()
            .await
            .map_err(|e| HarvestError::query_failed(context(), e))
    }

    async fn insert_records(&self, schema: &str, table: &str, records_json: &str) -> Result<u64> {
        let sql = insert_records_sql(schema, table);
        let result = sqlx::query(&sql)
            .bind(records_json)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                HarvestError::query_failed(format!("Failed to insert into {}.{}", schema, table), e)
            })?;
        Ok(result.rows_affected())
    }

    async fn serial_column(&self, schema: &str, table: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT column_name::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
              AND (column_default LIKE '%nextval%' OR is_identity = 'YES')
            ORDER BY ordinal_position
            LIMIT 1
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            let context = format!("Failed to find serial column of {}.{}", schema, table);
            HarvestError::query_failed(context, e)
        })
    }

    async fn reset_sequence(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<Option<i64>> {
        let target = qualified_name(schema, table);
        let sql = format!(
            "SELECT setval(pg_get_serial_sequence($1, $2), MAX({})) FROM {}",
            quote_ident(column),
            target
        );
        sqlx::query_scalar::<_, Option<i64>>(&sql)
            .bind(&target)
            .bind(column)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                let context = format!("Failed to reset sequence of {}.{}", schema, table);
                HarvestError::query_failed(context, e)
            })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
