//! Revision marker storage.
//!
//! The marker is a one-row, one-column table holding the highest applied
//! revision. Its absence is reported as [`Error::UninitializedMarker`] so
//! callers can tell a first run apart from a broken connection.

use std::sync::Arc;

use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::Revision;

/// Reads and persists the current revision
pub struct RevisionStore {
    db: Arc<Database>,
    table: String,
}

impl RevisionStore {
    /// `table` must already be a validated identifier (see [`crate::ApplierConfig::validate`])
    pub fn new(db: Arc<Database>, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Last durably recorded revision
    pub fn current(&self) -> Result<Revision> {
        self.db.with_connection(|conn| self.current_on(conn))
    }

    /// Create the marker table holding revision 0.
    ///
    /// Calling this on an initialized database is an error.
    pub fn bootstrap(&self) -> Result<()> {
        self.db
            .with_transaction(|conn| {
                conn.execute_batch(&format!(
                    "CREATE TABLE \"{table}\" (patch INTEGER NOT NULL);
                     INSERT INTO \"{table}\" (patch) VALUES (0);",
                    table = self.table
                ))?;
                Ok(())
            })
            .map_err(|e| match e {
                Error::Connectivity(ref err) if is_already_exists(err) => {
                    Error::InvalidState(format!("marker table `{}` already exists", self.table))
                }
                other => other,
            })?;

        info!(table = %self.table, "created marker table");
        Ok(())
    }

    /// Record `revision` as applied.
    ///
    /// Ordering is the caller's job; the store only persists.
    pub fn advance(&self, revision: Revision) -> Result<()> {
        let changed = self
            .db
            .execute(&self.update_sql(), params![marker_value(revision)?])
            .map_err(|e| self.classify(e))?;
        self.check_advanced(changed, revision)
    }

    pub(crate) fn current_on(&self, conn: &Connection) -> Result<Revision> {
        let rows = conn
            .prepare(&format!("SELECT patch FROM \"{}\"", self.table))
            .and_then(|mut stmt| {
                stmt.query_map([], |row| row.get::<_, i64>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(|e| self.classify(e.into()))?;

        match rows.as_slice() {
            [value] => u64::try_from(*value)
                .map(Revision::new)
                .map_err(|_| Error::corrupt_marker(&self.table, format!("negative revision {}", value))),
            [] => Err(Error::corrupt_marker(&self.table, "no row")),
            more => Err(Error::corrupt_marker(&self.table, format!("{} rows", more.len()))),
        }
    }

    /// Same as [`RevisionStore::advance`], on a connection that may be inside a transaction
    pub(crate) fn advance_on(&self, conn: &Connection, revision: Revision) -> Result<()> {
        let changed = conn
            .execute(&self.update_sql(), params![marker_value(revision)?])
            .map_err(|e| self.classify(e.into()))?;
        self.check_advanced(changed, revision)
    }

    fn update_sql(&self) -> String {
        format!("UPDATE \"{}\" SET patch = ?1", self.table)
    }

    fn check_advanced(&self, changed: usize, revision: Revision) -> Result<()> {
        if changed != 1 {
            return Err(Error::corrupt_marker(
                &self.table,
                format!("update touched {} rows", changed),
            ));
        }

        debug!(table = %self.table, %revision, "advanced marker");
        Ok(())
    }

    /// A missing marker table is the first-run condition, not a connectivity failure
    fn classify(&self, e: Error) -> Error {
        match e {
            Error::Connectivity(ref err) if is_missing_table(err) => Error::UninitializedMarker {
                table: self.table.clone(),
            },
            other => other,
        }
    }
}

fn marker_value(revision: Revision) -> Result<i64> {
    i64::try_from(revision.get())
        .map_err(|_| Error::InvalidState(format!("revision {} does not fit the marker", revision)))
}

fn sqlite_message(err: &rusqlite::Error) -> Option<&str> {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => Some(msg.as_str()),
        _ => None,
    }
}

fn is_missing_table(err: &rusqlite::Error) -> bool {
    sqlite_message(err).is_some_and(|msg| msg.starts_with("no such table"))
}

fn is_already_exists(err: &rusqlite::Error) -> bool {
    sqlite_message(err).is_some_and(|msg| msg.contains("already exists"))
}
