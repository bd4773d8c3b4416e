//! Command implementations for db-patch CLI.

pub mod apply;
pub mod status;

use anyhow::{Context, Result, bail};
use dbpatch_core::Database;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;

/// How a command uses the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// May create the file and write to it
    ReadWrite,
    /// Never creates or modifies anything
    ReadOnly,
}

/// Open the configured database.
fn open_database(config: &Config, access: Access) -> Result<Arc<Database>> {
    let path = config.database_path();
    let db = match access {
        Access::ReadWrite => {
            if !path.exists() {
                warn!(db = %path.display(), "database file does not exist yet, it will be created");
            }
            Database::open_path(path)
        }
        Access::ReadOnly => {
            if !path.exists() {
                bail!("database {} does not exist", path.display());
            }
            Database::open_read_only(path)
        }
    }
    .with_context(|| format!("failed to open db {}", path.display()))?;
    db.ping().context("database is not reachable")?;

    info!(db = %path.display(), ?access, "opened connection");
    Ok(Arc::new(db))
}
