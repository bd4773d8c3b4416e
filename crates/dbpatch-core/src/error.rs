//! Error types for dbpatch-core.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigValidationError;
use crate::types::Revision;

/// Result type alias using dbpatch-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for a patch run
#[derive(Error, Debug)]
pub enum Error {
    // Marker errors
    #[error("marker table `{table}` does not exist")]
    UninitializedMarker { table: String },

    #[error("marker table `{table}` is corrupt: {reason}")]
    CorruptMarker { table: String, reason: String },

    // Database errors
    #[error("Database error: {0}")]
    Connectivity(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    // Discovery errors
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    // Application errors
    #[error("failed to read patch#{revision} ({locator}): {source}")]
    Read {
        revision: Revision,
        locator: String,
        #[source]
        source: std::io::Error,
    },

    #[error("patch#{revision} ({locator}) failed after {elapsed:?}: {source}")]
    Transaction {
        revision: Revision,
        locator: String,
        elapsed: Duration,
        #[source]
        source: rusqlite::Error,
    },

    #[error(
        "patch#{revision} ({locator}) could not be recorded in the marker \
         (patch committed: {committed}): {source}"
    )]
    MarkerAdvance {
        revision: Revision,
        locator: String,
        committed: bool,
        #[source]
        source: Box<Error>,
    },

    // State machine errors
    #[error("invalid state: {0}")]
    InvalidState(String),

    // Operator errors
    #[error("operator prompt failed: {0}")]
    Prompt(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigValidationError),
}

impl Error {
    /// Create a corrupt marker error
    pub fn corrupt_marker(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptMarker {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is the expected first-run condition
    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Self::UninitializedMarker { .. })
    }

    /// A patch was committed without its revision being recorded.
    ///
    /// The next run will attempt it again, so an operator has to reconcile
    /// the marker by hand.
    pub fn needs_reconciliation(&self) -> bool {
        matches!(self, Self::MarkerAdvance { committed: true, .. })
    }

    /// Revision of the patch this error is about, if any
    pub fn revision(&self) -> Option<Revision> {
        match self {
            Self::Read { revision, .. }
            | Self::Transaction { revision, .. }
            | Self::MarkerAdvance { revision, .. } => Some(*revision),
            _ => None,
        }
    }
}

/// Problems found while scanning a patch source.
///
/// All of these are reported before any change is attempted.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("no patches found in {0}")]
    EmptySource(String),

    #[error("cannot derive a revision from `{0}`")]
    Unparsable(String),

    #[error("`{locator}` has revision {revision}; revisions run from 1 to {}", Revision::MAX)]
    InvalidRevision { locator: String, revision: u64 },

    #[error("revision {revision} is claimed by both `{first}` and `{second}`")]
    Duplicate {
        revision: Revision,
        first: String,
        second: String,
    },

    #[error("cannot list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
