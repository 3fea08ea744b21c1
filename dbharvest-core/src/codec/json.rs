//! Indented JSON bundles.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::Result;
use crate::error::HarvestError;
use crate::models::{Bundle, BundleFormat, Table, Value};

#[derive(Serialize, Deserialize)]
struct JsonBundle {
    format: BundleFormat,
    environment: String,
    schema: String,
    tables: Vec<JsonTable>,
}

#[derive(Serialize, Deserialize)]
struct JsonTable {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<JsonValue>>,
}

pub(super) fn encode(bundle: &Bundle) -> Result<Vec<u8>> {
    let document = JsonBundle {
        format: bundle.format,
        environment: bundle.environment.clone(),
        schema: bundle.schema.clone(),
        tables: bundle
            .tables
            .iter()
            .map(|table| JsonTable {
                name: table.name.clone(),
                columns: table.columns.clone(),
                rows: table
                    .rows
                    .iter()
                    .map(|row| row.iter().map(Value::to_json).collect())
                    .collect(),
            })
            .collect(),
    };
    serde_json::to_vec_pretty(&document)
        .map_err(|e| HarvestError::codec("Failed to encode json bundle", e))
}

pub(super) fn decode(bytes: &[u8]) -> Result<Bundle> {
    let document: JsonBundle = serde_json::from_slice(bytes)
        .map_err(|e| HarvestError::codec("Malformed json bundle", e))?;

    let mut bundle = Bundle::new(document.format, document.environment, document.schema);
    for source in document.tables {
        let mut table = Table::new(source.name, source.columns);
        for row in source.rows {
            table.push_row(row.into_iter().map(Value::from_json).collect())?;
        }
        bundle.tables.push(table);
    }
    Ok(bundle)
}
