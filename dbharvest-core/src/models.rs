//! Bundle data model shared by the export engine, the import engine, and the
//! codecs.
//!
//! A [`Bundle`] is materialized completely in memory before it is encoded and
//! is rebuilt completely when decoded. Rows are positional: every row of a
//! [`Table`] holds exactly one [`Value`] per entry in `columns`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::{Result, error::HarvestError};

/// Per-table obscuring rules: column name to pattern.
///
/// A column without an entry keeps its live value.
pub type ObscurePolicy = BTreeMap<String, String>;

/// One positional row, aligned with [`Table::columns`].
pub type Row = Vec<Value>;

/// Wire format of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleFormat {
    /// Binary encoding that keeps every value's native type
    Raw,
    /// Zip archive of one CSV file per table plus `info.json`
    Csv,
    /// Single indented JSON document
    #[default]
    Json,
}

/// Suffix appended to the group name for archived CSV bundles.
pub const CSV_ARCHIVE_SUFFIX: &str = "-csv.zip";

impl BundleFormat {
    /// Parses a format label leniently.
    ///
    /// `"raw"` and `"csv"` select those formats; every other label, including
    /// invalid ones, selects JSON.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "raw" => Self::Raw,
            "csv" => Self::Csv,
            _ => Self::Json,
        }
    }

    /// Lowercase label recorded in bundles.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    /// File name a bundle for `group_name` is written to.
    pub fn file_name(self, group_name: &str) -> String {
        match self {
            Self::Csv => format!("{}{}", group_name, CSV_ARCHIVE_SUFFIX),
            Self::Raw | Self::Json => format!("{}.{}", group_name, self.as_str()),
        }
    }
}

impl std::fmt::Display for BundleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A nullable, loosely typed column value.
///
/// The raw format keeps every variant as is. The text formats (json, csv)
/// reduce values to what JSON can express: temporal values become strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// Integral number
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Text, and any type without a dedicated variant read through a text cast
    Text(String),
    /// Calendar date
    Date(NaiveDate),
    /// Timestamp without time zone
    Timestamp(NaiveDateTime),
    /// Timestamp with time zone, normalized to UTC
    TimestampTz(DateTime<Utc>),
    /// Nested structured value (json/jsonb columns, arrays, objects)
    Json(#[serde(with = "json_text")] JsonValue),
}

impl Value {
    /// Returns true for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Converts the value to its JSON representation.
    ///
    /// Non-finite floats have no JSON number form and are written as the
    /// strings PostgreSQL accepts for them: `"NaN"`, `"Infinity"`, and
    /// `"-Infinity"`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::from(*i),
            Self::Float(f) => float_to_json(*f),
            Self::Text(s) => JsonValue::String(s.clone()),
            Self::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            Self::Timestamp(ts) => {
                JsonValue::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            Self::TimestampTz(ts) => {
                JsonValue::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::Json(v) => v.clone(),
        }
    }

    /// Builds a value from decoded JSON.
    ///
    /// Integers that fit in `i64` stay integral; all other numbers become
    /// floats. Arrays and objects are kept as nested structured values.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            JsonValue::String(s) => Self::Text(s),
            nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => Self::Json(nested),
        }
    }
}

fn float_to_json(f: f64) -> JsonValue {
    if let Some(n) = serde_json::Number::from_f64(f) {
        return JsonValue::Number(n);
    }
    let label = if f.is_nan() {
        "NaN"
    } else if f.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    };
    JsonValue::String(label.to_string())
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Stores nested JSON as text so non-self-describing encoders can carry it.
mod json_text {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use serde_json::Value as JsonValue;

    pub(super) fn serialize<S: Serializer>(
        value: &JsonValue,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<JsonValue, D::Error> {
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map_err(D::Error::custom)
    }
}

/// One exported table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name, unqualified
    pub name: String,
    /// Column names in row order
    pub columns: Vec<String>,
    /// Rows, each exactly `columns.len()` wide
    pub rows: Vec<Row>,
}

impl Table {
    /// Creates an empty table with the given column layout.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row, rejecting rows whose width differs from the column count.
    pub fn push_row(&mut self, row: Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(HarvestError::malformed(format!(
                "Table '{}' has {} columns but row has {} values",
                self.name,
                self.columns.len(),
                row.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Rows reassembled as column-name-keyed JSON records.
    pub fn records(&self) -> Vec<serde_json::Map<String, JsonValue>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| (column.clone(), value.to_json()))
                    .collect()
            })
            .collect()
    }
}

/// The complete snapshot produced by one export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    /// Format the bundle was exported as
    pub format: BundleFormat,
    /// Label of the source environment
    pub environment: String,
    /// Schema the tables were read from
    pub schema: String,
    /// Tables in configuration order
    pub tables: Vec<Table>,
}

impl Bundle {
    /// Creates an empty bundle.
    pub fn new(
        format: BundleFormat,
        environment: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            format,
            environment: environment.into(),
            schema: schema.into(),
            tables: Vec::new(),
        }
    }

    /// Total number of rows across all tables.
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_from_label_is_lenient() {
        assert_eq!(BundleFormat::from_label("raw"), BundleFormat::Raw);
        assert_eq!(BundleFormat::from_label("CSV"), BundleFormat::Csv);
        assert_eq!(BundleFormat::from_label("json"), BundleFormat::Json);
        assert_eq!(BundleFormat::from_label("xml"), BundleFormat::Json);
        assert_eq!(BundleFormat::from_label(""), BundleFormat::Json);
    }

    #[test]
    fn test_format_file_names() {
        assert_eq!(BundleFormat::Raw.file_name("orgs"), "orgs.raw");
        assert_eq!(BundleFormat::Json.file_name("orgs"), "orgs.json");
        assert_eq!(BundleFormat::Csv.file_name("orgs"), "orgs-csv.zip");
    }

    #[test]
    fn test_format_serializes_lowercase() {
        assert_eq!(serde_json::to_value(BundleFormat::Raw).unwrap(), json!("raw"));
        let parsed: BundleFormat = serde_json::from_value(json!("csv")).unwrap();
        assert_eq!(parsed, BundleFormat::Csv);
    }

    #[test]
    fn test_value_to_json_degrades_temporal_types() {
        let date = NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();
        let ts = date.and_hms_opt(5, 6, 7).unwrap();
        let tz = DateTime::<Utc>::from_naive_utc_and_offset(ts, Utc);

        assert_eq!(Value::Date(date).to_json(), json!("2021-03-04"));
        assert_eq!(Value::Timestamp(ts).to_json(), json!("2021-03-04T05:06:07"));
        assert_eq!(Value::TimestampTz(tz).to_json(), json!("2021-03-04T05:06:07Z"));
    }

    #[test]
    fn test_non_finite_floats_survive_as_postgres_literals() {
        assert_eq!(Value::Float(f64::NAN).to_json(), json!("NaN"));
        assert_eq!(Value::Float(f64::INFINITY).to_json(), json!("Infinity"));
        assert_eq!(Value::Float(f64::NEG_INFINITY).to_json(), json!("-Infinity"));
        assert_eq!(Value::Float(2.5).to_json(), json!(2.5));

        let mut table = Table::new("readings", vec!["id".to_string(), "f".to_string()]);
        table.push_row(vec![Value::Int(1), Value::Float(f64::NAN)]).unwrap();
        let records = table.records();
        assert_eq!(records[0]["f"], json!("NaN"));
        assert!(!records[0]["f"].is_null());
    }

    #[test]
    fn test_value_from_json() {
        assert_eq!(Value::from_json(json!(7)), Value::Int(7));
        assert_eq!(Value::from_json(json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from_json(json!("x")), Value::Text("x".to_string()));
        assert_eq!(Value::from_json(json!(null)), Value::Null);
        assert_eq!(Value::from_json(json!({"a": 1})), Value::Json(json!({"a": 1})));
    }

    #[test]
    fn test_push_row_enforces_width() {
        let mut table = Table::new("accounts", vec!["id".to_string(), "email".to_string()]);
        assert!(table.push_row(vec![Value::Int(1), "a@x.com".into()]).is_ok());
        assert!(table.push_row(vec![Value::Int(2)]).is_err());
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_records_are_keyed_by_column() {
        let mut table = Table::new("accounts", vec!["id".to_string(), "email".to_string()]);
        table.push_row(vec![Value::Int(1), Value::Null]).unwrap();

        let records = table.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], json!(1));
        assert_eq!(records[0]["email"], JsonValue::Null);
    }
}
