//! Target environment labels.

use std::fmt;
use std::str::FromStr;

use crate::error::HarvestError;

/// Prefix selecting a connection defined in the configuration file.
pub const CUSTOM_PREFIX: &str = "custom:";

/// The database an export reads from or an import writes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetEnvironment {
    /// Local development database
    Development,
    /// Shared staging database
    Staging,
    /// Demo database; read-only for dbharvest
    Demo,
    /// Production database; read-only for dbharvest
    Production,
    /// Connection taken from the `custom_db.<name>` configuration entry
    Custom(String),
}

impl TargetEnvironment {
    /// Label recorded in bundles and accepted by [`FromStr`].
    pub fn label(&self) -> String {
        match self {
            Self::Development => "development".to_string(),
            Self::Staging => "staging".to_string(),
            Self::Demo => "demo".to_string(),
            Self::Production => "production".to_string(),
            Self::Custom(name) => format!("{}{}", CUSTOM_PREFIX, name),
        }
    }

    /// Whether import and clean may modify this environment.
    pub fn allows_writes(&self) -> bool {
        !matches!(self, Self::Demo | Self::Production)
    }

    /// Name of the configuration entry for custom targets.
    pub fn custom_name(&self) -> Option<&str> {
        match self {
            Self::Custom(name) => Some(name),
            _ => None,
        }
    }

    /// Environment variable holding the connection URL of a named environment.
    pub fn url_variable(&self) -> Option<String> {
        match self {
            Self::Custom(_) => None,
            named => Some(format!("DBHARVEST_{}_DATABASE_URL", named.label().to_ascii_uppercase())),
        }
    }

    /// Refuses destructive operations on protected environments.
    ///
    /// # Errors
    /// Returns a configuration error for `demo` and `production`.
    pub fn ensure_writable(&self, operation: &str) -> crate::Result<()> {
        if self.allows_writes() {
            Ok(())
        } else {
            Err(HarvestError::configuration(format!(
                "{} is not allowed on the {} environment",
                operation,
                self.label()
            )))
        }
    }
}

impl FromStr for TargetEnvironment {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(name) = trimmed.strip_prefix(CUSTOM_PREFIX) {
            let name = name.trim();
            if name.is_empty() {
                return Err(HarvestError::configuration(
                    "custom environment requires a name (custom:<name>)",
                ));
            }
            return Ok(Self::Custom(name.to_string()));
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "demo" => Ok(Self::Demo),
            "production" => Ok(Self::Production),
            "custom" => Err(HarvestError::configuration(
                "custom environment requires a name (custom:<name>)",
            )),
            other => Err(HarvestError::configuration(format!(
                "Unknown target environment '{}': expected development, staging, demo, \
                 production, or custom:<name>",
                other
            ))),
        }
    }
}

impl fmt::Display for TargetEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
