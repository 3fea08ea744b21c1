//! Bundle configuration, target environments, and connection resolution.
//!
//! # Module Structure
//! - `environment`: [`TargetEnvironment`] labels and write protection
//! - `connection`: custom connections and URL resolution

mod connection;
mod environment;

pub use connection::{
    ConnectionSettings, CustomConnection, FALLBACK_URL_VARIABLE, resolve_database_url, resolve_with,
};
pub use environment::{CUSTOM_PREFIX, TargetEnvironment};

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::HarvestError;
use crate::models::ObscurePolicy;

/// The bundle configuration file.
///
/// # Example
/// ```rust
/// use dbharvest_core::config::BundleConfig;
///
/// let config = BundleConfig::from_json(r#"{
///     "table-group-name": "organizations",
///     "schema": "sote",
///     "tables": ["organizations", "contacts"],
///     "obscure": { "contacts": { "email": "[a-z]{5,10}@test.com" } }
/// }"#).unwrap();
///
/// assert_eq!(config.tables.len(), 2);
/// assert!(config.policy_for("contacts").is_some());
/// assert!(config.policy_for("organizations").is_none());
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BundleConfig {
    /// Bundle name; also the output file stem
    #[serde(rename = "table-group-name")]
    pub table_group_name: String,
    /// Schema the tables live in
    pub schema: String,
    /// Tables to export, in bundle order
    pub tables: Vec<String>,
    /// Per-table obscuring rules
    #[serde(default)]
    pub obscure: BTreeMap<String, ObscurePolicy>,
    /// Connections selected by `custom:<name>` targets
    #[serde(default)]
    pub custom_db: BTreeMap<String, CustomConnection>,
}

impl BundleConfig {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    /// Returns a configuration error if the file is missing, malformed, or
    /// fails [`BundleConfig::validate`].
    pub fn load(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            HarvestError::configuration(format!(
                "Cannot read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&text).map_err(|e| match e {
            HarvestError::Configuration { message } => {
                HarvestError::configuration(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    /// Returns a configuration error if the text is not valid configuration.
    pub fn from_json(text: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| HarvestError::configuration(format!("Malformed configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the fields every operation depends on.
    ///
    /// # Errors
    /// Returns a configuration error for an empty or path-like group name,
    /// an empty schema, or an empty table list.
    pub fn validate(&self) -> crate::Result<()> {
        if self.table_group_name.trim().is_empty() {
            return Err(HarvestError::configuration("table-group-name cannot be empty"));
        }
        if self.table_group_name.contains(['/', '\\']) {
            return Err(HarvestError::configuration(
                "table-group-name cannot contain path separators",
            ));
        }
        if self.schema.trim().is_empty() {
            return Err(HarvestError::configuration("schema cannot be empty"));
        }
        if self.tables.is_empty() {
            return Err(HarvestError::configuration("tables cannot be empty"));
        }
        if self.tables.iter().any(|t| t.trim().is_empty()) {
            return Err(HarvestError::configuration("table names cannot be empty"));
        }
        Ok(())
    }

    /// Obscuring rules for `table`, if any.
    pub fn policy_for(&self, table: &str) -> Option<&ObscurePolicy> {
        self.obscure.get(table).filter(|policy| !policy.is_empty())
    }

    /// The `custom_db` entry named `name`.
    ///
    /// # Errors
    /// Returns a configuration error when no such entry exists.
    pub fn custom_connection(&self, name: &str) -> crate::Result<&CustomConnection> {
        self.custom_db.get(name).ok_or_else(|| {
            HarvestError::configuration(format!("custom_db has no entry named '{}'", name))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "table-group-name": "organizations",
        "schema": "sote",
        "tables": ["organizations", "contacts"],
        "obscure": { "contacts": { "email": "[a-z]{5,10}@test.com", "phone": "[0-9]{10}" } },
        "custom_db": {
            "local": { "name": "sote", "user": "u", "password": "p",
                       "host": "localhost", "sslmode": "disable", "port": 5432 }
        }
    }"#;

    #[test]
    fn test_parse_full_configuration() {
        let config = BundleConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.table_group_name, "organizations");
        assert_eq!(config.schema, "sote");
        assert_eq!(config.tables, vec!["organizations", "contacts"]);

        let policy = config.policy_for("contacts").unwrap();
        assert_eq!(policy.get("phone").map(String::as_str), Some("[0-9]{10}"));

        let custom = config.custom_connection("local").unwrap();
        assert_eq!(custom.port, 5432);
        assert!(config.custom_connection("missing").is_err());
    }

    #[test]
    fn test_optional_sections_default_to_empty() {
        let config =
            BundleConfig::from_json(r#"{"table-group-name":"g","schema":"s","tables":["t"]}"#)
                .unwrap();
        assert!(config.obscure.is_empty());
        assert!(config.custom_db.is_empty());
        assert!(config.policy_for("t").is_none());
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            r#"{"table-group-name":"","schema":"s","tables":["t"]}"#,
            r#"{"table-group-name":"../g","schema":"s","tables":["t"]}"#,
            r#"{"table-group-name":"g","schema":"","tables":["t"]}"#,
            r#"{"table-group-name":"g","schema":"s","tables":[]}"#,
            r#"{"table-group-name":"g","schema":"s","tables":[""]}"#,
            r#"{"schema":"s","tables":["t"]}"#,
            "not json",
        ];
        for case in cases {
            let err = BundleConfig::from_json(case).unwrap_err();
            assert!(matches!(err, HarvestError::Configuration { .. }), "case: {}", case);
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = BundleConfig::load(file.path()).unwrap();
        assert_eq!(config.table_group_name, "organizations");
    }

    #[test]
    fn test_load_missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = BundleConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, HarvestError::Configuration { .. }));
    }
}
