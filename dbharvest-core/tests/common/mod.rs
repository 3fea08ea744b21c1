//! In-memory `DataStore` used by the engine integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use dbharvest_core::{
    DataStore, HarvestError, IndexDefinition, Result, Row, Table, TableScan, Value,
};
use serde_json::Value as JsonValue;

/// One table held by [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub unique_indexes: Vec<IndexDefinition>,
    pub serial: Option<String>,
    pub sequence: Option<i64>,
    pub fail_reads: bool,
    pub fail_index_lookup: bool,
    pub fail_writes: bool,
}

impl MemoryTable {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_unique_index(mut self, name: &str, columns: &str) -> Self {
        self.unique_indexes.push(IndexDefinition {
            name: name.to_string(),
            definition: format!("CREATE UNIQUE INDEX {} ON s.t USING btree ({})", name, columns),
        });
        self
    }

    pub fn with_serial(mut self, column: &str) -> Self {
        self.serial = Some(column.to_string());
        self
    }
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, MemoryTable>,
    calls: Vec<String>,
    closed: bool,
}

/// A `DataStore` over `schema.table`-keyed in-memory tables.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn key(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table)
}

fn failure(context: String) -> HarvestError {
    HarvestError::query_failed(context, std::io::Error::other("simulated failure"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, schema: &str, name: &str, table: MemoryTable) -> Self {
        self.state.lock().unwrap().tables.insert(key(schema, name), table);
        self
    }

    pub fn table(&self, schema: &str, name: &str) -> Option<MemoryTable> {
        self.state.lock().unwrap().tables.get(&key(schema, name)).cloned()
    }

    pub fn rows(&self, schema: &str, name: &str) -> Vec<Row> {
        self.table(schema, name).map(|t| t.rows).unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn with_state<T>(&self, call: String, f: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        f(&mut state)
    }
}

fn lookup<'a>(state: &'a mut State, schema: &str, table: &str) -> Result<&'a mut MemoryTable> {
    state
        .tables
        .get_mut(&key(schema, table))
        .ok_or_else(|| failure(format!("relation {}.{} does not exist", schema, table)))
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn read_table(&self, schema: &str, table: &str) -> Result<TableScan> {
        self.with_state(format!("read {}", table), |state| {
            let t = lookup(state, schema, table)?;
            if t.fail_reads {
                return Err(failure(format!("Failed to read {}", table)));
            }
            Ok(TableScan {
                columns: t.columns.clone(),
                rows: t.rows.clone(),
            })
        })
    }

    async fn unique_index_definitions(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<IndexDefinition>> {
        self.with_state(format!("indexes {}", table), |state| {
            let t = lookup(state, schema, table)?;
            if t.fail_index_lookup {
                return Err(failure(format!("Failed to list indexes of {}", table)));
            }
            Ok(t.unique_indexes.clone())
        })
    }

    async fn delete_all(&self, schema: &str, table: &str) -> Result<u64> {
        self.with_state(format!("delete {}", table), |state| {
            let t = lookup(state, schema, table)?;
            if t.fail_writes {
                return Err(failure(format!("Failed to delete from {}", table)));
            }
            let removed = t.rows.len() as u64;
            t.rows.clear();
            Ok(removed)
        })
    }

    async fn copy_rows(&self, schema: &str, table: &Table) -> Result<u64> {
        self.with_state(format!("copy {}", table.name), |state| {
            let t = lookup(state, schema, &table.name)?;
            if t.fail_writes || t.columns != table.columns {
                return Err(failure(format!("Failed to copy into {}", table.name)));
            }
            t.rows.extend(table.rows.iter().cloned());
            Ok(table.rows.len() as u64)
        })
    }

    async fn insert_records(&self, schema: &str, table: &str, records_json: &str) -> Result<u64> {
        self.with_state(format!("insert {}", table), |state| {
            let t = lookup(state, schema, table)?;
            if t.fail_writes {
                return Err(failure(format!("Failed to insert into {}", table)));
            }
            let records: Vec<serde_json::Map<String, JsonValue>> =
                serde_json::from_str(records_json).map_err(|e| failure(e.to_string()))?;
            for record in &records {
                let row = t
                    .columns
                    .iter()
                    .map(|c| Value::from_json(record.get(c).cloned().unwrap_or(JsonValue::Null)))
                    .collect();
                t.rows.push(row);
            }
            Ok(records.len() as u64)
        })
    }

    async fn serial_column(&self, schema: &str, table: &str) -> Result<Option<String>> {
        self.with_state(format!("serial {}", table), |state| {
            Ok(lookup(state, schema, table)?.serial.clone())
        })
    }

    async fn reset_sequence(&self, schema: &str, table: &str, column: &str) -> Result<Option<i64>> {
        self.with_state(format!("setval {}", table), |state| {
            let t = lookup(state, schema, table)?;
            let position = t.columns.iter().position(|c| c == column);
            let max = position.and_then(|p| {
                t.rows
                    .iter()
                    .filter_map(|row| match row.get(p) {
                        Some(Value::Int(i)) => Some(*i),
                        _ => None,
                    })
                    .max()
            });
            if max.is_some() {
                t.sequence = max;
            }
            Ok(max)
        })
    }

    async fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.calls.push("close".to_string());
        state.closed = true;
    }
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}
