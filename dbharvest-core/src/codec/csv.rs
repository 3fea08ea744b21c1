//! Zip-archived CSV bundles.
//!
//! `info.json` carries the bundle metadata. Each `<table>.csv` entry starts
//! with a comma-joined header line; every following line holds one row as
//! comma-separated JSON values, so strings keep their quotes and escapes.

use std::io::{Cursor, Read, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::Result;
use crate::error::HarvestError;
use crate::models::{Bundle, BundleFormat, Table, Value};

const INFO_ENTRY: &str = "info.json";
const TABLE_EXTENSION: &str = ".csv";

#[derive(Serialize, Deserialize)]
struct ArchiveInfo {
    format: BundleFormat,
    environment: String,
    schema: String,
}

pub(super) fn encode(bundle: &Bundle) -> Result<Vec<u8>> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    let info = ArchiveInfo {
        format: bundle.format,
        environment: bundle.environment.clone(),
        schema: bundle.schema.clone(),
    };
    let info = serde_json::to_vec(&info)
        .map_err(|e| HarvestError::codec("Failed to encode info.json", e))?;
    write_entry(&mut writer, INFO_ENTRY, &info, options)?;

    for table in &bundle.tables {
        let name = format!("{}{}", table.name, TABLE_EXTENSION);
        write_entry(&mut writer, &name, table_text(table).as_bytes(), options)?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| HarvestError::codec("Failed to finish csv archive", e))?;
    Ok(cursor.into_inner())
}

fn write_entry(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: &str,
    data: &[u8],
    options: SimpleFileOptions,
) -> Result<()> {
    writer
        .start_file(name, options)
        .map_err(|e| HarvestError::codec(format!("Failed to add {} to csv archive", name), e))?;
    writer
        .write_all(data)
        .map_err(|e| HarvestError::codec(format!("Failed to write {} to csv archive", name), e))
}

fn table_text(table: &Table) -> String {
    let mut text = table.columns.join(",");
    text.push('\n');
    for row in &table.rows {
        let line: Vec<String> = row.iter().map(|value| value.to_json().to_string()).collect();
        text.push_str(&line.join(","));
        text.push('\n');
    }
    text
}

pub(super) fn decode(bytes: &[u8]) -> Result<Bundle> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| HarvestError::codec("Malformed csv archive", e))?;

    let mut info: Option<ArchiveInfo> = None;
    let mut tables = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| HarvestError::codec("Unreadable csv archive entry", e))?;
        let name = entry.name().to_string();
        let mut text = String::new();
        entry.read_to_string(&mut text).map_err(|e| {
            HarvestError::codec(format!("Failed to read {} from csv archive", name), e)
        })?;

        if name == INFO_ENTRY {
            info = Some(
                serde_json::from_str(&text)
                    .map_err(|e| HarvestError::codec("Malformed info.json in csv archive", e))?,
            );
        } else if let Some(table_name) = name.strip_suffix(TABLE_EXTENSION) {
            tables.push(parse_table(table_name, &text));
        } else {
            tracing::debug!("Ignoring csv archive entry {}", name);
        }
    }

    let info = info.ok_or_else(|| HarvestError::malformed("csv archive has no info.json"))?;
    let mut bundle = Bundle::new(info.format, info.environment, info.schema);
    bundle.tables = tables;
    Ok(bundle)
}

/// Rebuilds one table. Lines that are not valid JSON values or whose value
/// count differs from the header are skipped.
fn parse_table(name: &str, text: &str) -> Table {
    let mut lines = text.split('\n');
    let header = lines.next().unwrap_or_default();
    let columns: Vec<String> = if header.is_empty() {
        Vec::new()
    } else {
        header.split(',').map(str::to_string).collect()
    };

    let mut table = Table::new(name, columns);
    for (number, line) in lines.enumerate() {
        let parsed: Option<Vec<JsonValue>> = serde_json::from_str(&format!("[{}]", line)).ok();
        let row: Vec<Value> = parsed
            .unwrap_or_default()
            .into_iter()
            .map(Value::from_json)
            .collect();
        if row.len() != table.columns.len() || table.columns.is_empty() {
            if !line.is_empty() {
                tracing::debug!("{}: skipping line {} with {} values", name, number + 2, row.len());
            }
            continue;
        }
        table.rows.push(row);
    }
    table
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn archive_entries(bytes: &[u8]) -> Vec<(String, String)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut entry = archive.by_index(i).unwrap();
                let mut text = String::new();
                entry.read_to_string(&mut text).unwrap();
                (entry.name().to_string(), text)
            })
            .collect()
    }

    #[test]
    fn test_archive_layout() {
        let mut bundle = Bundle::new(BundleFormat::Csv, "staging", "sote");
        let mut table = Table::new("contacts", vec!["id".to_string(), "name".to_string()]);
        table.push_row(vec![Value::Int(1), "Doe, \"J\"".into()]).unwrap();
        table.push_row(vec![Value::Int(2), Value::Null]).unwrap();
        bundle.tables.push(table);

        let entries = archive_entries(&encode(&bundle).unwrap());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "info.json");
        let info: JsonValue = serde_json::from_str(&entries[0].1).unwrap();
        assert_eq!(info["format"], "csv");
        assert_eq!(info["environment"], "staging");
        assert_eq!(info["schema"], "sote");

        assert_eq!(entries[1].0, "contacts.csv");
        assert_eq!(entries[1].1, "id,name\n1,\"Doe, \\\"J\\\"\"\n2,null\n");
    }

    #[test]
    fn test_parse_table_skips_bad_lines() {
        let table = parse_table("t", "a,b\n1,\"x\"\n2\nnot json\n3,null\n");
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(
            table.rows,
            vec![vec![Value::Int(1), "x".into()], vec![Value::Int(3), Value::Null]]
        );
    }

    #[test]
    fn test_missing_info_is_rejected() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("t.csv", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"a\n1\n").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert!(decode(&bytes).is_err());
    }
}
