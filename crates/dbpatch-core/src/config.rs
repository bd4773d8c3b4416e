//! Applier Configuration
//!
//! The value object handed to [`crate::PatchApplier`] at construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default name of the marker table
pub const DEFAULT_MARKER_TABLE: &str = "patch";

/// How a patch script and its marker update are committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerMode {
    /// Script and marker update commit in one transaction
    #[default]
    SameTransaction,
    /// Script commits first, then the marker is updated on its own.
    ///
    /// A crash between the two leaves the patch applied but unrecorded.
    Separate,
}

impl MarkerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerMode::SameTransaction => "same-transaction",
            MarkerMode::Separate => "separate",
        }
    }
}

impl fmt::Display for MarkerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarkerMode {
    type Err = ConfigValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "same-transaction" => Ok(MarkerMode::SameTransaction),
            "separate" => Ok(MarkerMode::Separate),
            other => Err(ConfigValidationError::InvalidValue {
                field: "marker_mode".into(),
                message: format!("unknown mode `{}` (expected same-transaction or separate)", other),
            }),
        }
    }
}

/// Applier configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplierConfig {
    /// Table holding the current revision
    pub marker_table: String,

    /// Commit strategy for the marker update (default: same-transaction)
    pub marker_mode: MarkerMode,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            marker_table: DEFAULT_MARKER_TABLE.to_string(),
            marker_mode: MarkerMode::default(),
        }
    }
}

impl ApplierConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different marker table
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.marker_table = table.into();
        self
    }

    /// Set the marker commit strategy
    pub fn with_marker_mode(mut self, mode: MarkerMode) -> Self {
        self.marker_mode = mode;
        self
    }

    /// Validate configuration.
    ///
    /// The table name is spliced into SQL, so it must be a plain identifier.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let table = &self.marker_table;
        if table.is_empty() {
            return Err(ConfigValidationError::MissingTable);
        }

        let mut chars = table.chars();
        let starts_ok = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        if !starts_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigValidationError::InvalidValue {
                field: "marker_table".into(),
                message: format!("`{}` is not a plain SQL identifier", table),
            });
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("marker_table is required")]
    MissingTable,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
