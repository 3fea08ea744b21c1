//! Bundle wire formats.
//!
//! | Format | Layout |
//! |--------|--------|
//! | `raw`  | `bincode` encoding of the whole [`Bundle`]; keeps every value type |
//! | `json` | one indented document, rows as positional arrays |
//! | `csv`  | zip archive: `info.json` plus one `<table>.csv` per table |
//!
//! The text formats keep numbers, strings, booleans, and nulls. Temporal
//! values become strings.

mod csv;
mod json;
mod raw;

use crate::Result;
use crate::error::HarvestError;
use crate::models::{Bundle, BundleFormat, CSV_ARCHIVE_SUFFIX};

/// Encodes `bundle` in the format it records.
///
/// # Errors
/// Returns a codec error if the bundle cannot be represented.
pub fn encode(bundle: &Bundle) -> Result<Vec<u8>> {
    match bundle.format {
        BundleFormat::Raw => raw::encode(bundle),
        BundleFormat::Csv => csv::encode(bundle),
        BundleFormat::Json => json::encode(bundle),
    }
}

/// Decodes bundle bytes read from `source_name`, detecting the format with
/// [`detect_format`].
///
/// # Errors
/// Returns a codec error for malformed content or when the format recorded
/// inside the bundle does not match its encoding.
pub fn decode(bytes: &[u8], source_name: &str) -> Result<Bundle> {
    let format = detect_format(bytes, source_name);
    tracing::debug!("Decoding {} as {}", source_name, format);
    let bundle = match format {
        BundleFormat::Raw => raw::decode(bytes)?,
        BundleFormat::Csv => csv::decode(bytes)?,
        BundleFormat::Json => json::decode(bytes)?,
    };
    ensure_format(format, bundle.format)?;
    Ok(bundle)
}

/// Archived CSV is recognized by the `-csv.zip` name suffix. Anything else
/// whose first non-blank byte opens a JSON object is json; the rest is raw.
///
/// ```rust
/// use dbharvest_core::codec::detect_format;
/// use dbharvest_core::models::BundleFormat;
///
/// assert_eq!(detect_format(b"PK\x03\x04", "orgs-csv.zip"), BundleFormat::Csv);
/// assert_eq!(detect_format(b"\n {\"format\": \"json\"}", "orgs.json"), BundleFormat::Json);
/// assert_eq!(detect_format(&[0, 0, 0, 0], "orgs.raw"), BundleFormat::Raw);
/// ```
pub fn detect_format(bytes: &[u8], source_name: &str) -> BundleFormat {
    if source_name.ends_with(CSV_ARCHIVE_SUFFIX) {
        return BundleFormat::Csv;
    }
    match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => BundleFormat::Json,
        _ => BundleFormat::Raw,
    }
}

fn ensure_format(expected: BundleFormat, recorded: BundleFormat) -> Result<()> {
    if expected == recorded {
        Ok(())
    } else {
        Err(HarvestError::malformed(format!(
            "Bundle encoded as {} records format {}",
            expected, recorded
        )))
    }
}
