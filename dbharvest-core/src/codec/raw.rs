//! Binary bundles.
//!
//! The whole [`Bundle`] is written with `bincode`. Field order puts the format
//! tag first, so a raw bundle never starts with `{`.

use crate::Result;
use crate::error::HarvestError;
use crate::models::Bundle;

pub(super) fn encode(bundle: &Bundle) -> Result<Vec<u8>> {
    bincode::serialize(bundle).map_err(|e| HarvestError::codec("Failed to encode raw bundle", e))
}

pub(super) fn decode(bytes: &[u8]) -> Result<Bundle> {
    let bundle: Bundle = bincode::deserialize(bytes)
        .map_err(|e| HarvestError::codec("Malformed raw bundle", e))?;
    for table in &bundle.tables {
        if let Some(row) = table.rows.iter().find(|row| row.len() != table.columns.len()) {
            return Err(HarvestError::malformed(format!(
                "Table '{}' has {} columns but a row has {} values",
                table.name,
                table.columns.len(),
                row.len()
            )));
        }
    }
    Ok(bundle)
}
