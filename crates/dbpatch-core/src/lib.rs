//! dbpatch-core - Core library for db-patch
//!
//! Applies an ordered set of SQL patch files to a database exactly once each:
//!
//! - **discovery**: find patch files and derive their revisions
//! - **revision**: read, create and advance the revision marker table
//! - **applier**: the run state machine (bootstrap, confirm, apply)
//! - **db**: SQLite connection wrapper
//! - **source**: where patch scripts are listed and read from

pub mod applier;
pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod revision;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use applier::{
    AppliedUnit, AssumeYes, Decision, DecisionKind, Gate, Outcome, PatchApplier, Preview, RunState,
    Step, run,
};
pub use config::{ApplierConfig, ConfigValidationError, MarkerMode};
pub use db::Database;
pub use discovery::discover;
pub use error::{DiscoveryError, Error, Result};
pub use revision::RevisionStore;
pub use source::{DirSource, PatchSource, SourceEntry};
pub use types::{PatchSet, PatchUnit, Revision};
