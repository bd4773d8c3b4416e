//! Direct SQLite database access for db-patch.
//!
//! This is the connection seam the rest of the crate runs through:
//! - `execute_transaction`: run a whole script atomically
//! - `execute`: run one parameterised statement
//! - `with_transaction`: run several steps that commit or roll back together

use crate::error::{Error, Result};
use rusqlite::{Connection, OpenFlags, Params};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open database at specific path
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(Error::Connectivity)?;
        debug!("Opened database at {:?}", path);
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an existing database for reading only.
    ///
    /// A missing file is an error rather than being created.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(Error::Connectivity)?;
        debug!("Opened database read-only at {:?}", path);
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Connectivity)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch("SELECT 1").map_err(Error::Connectivity)
    }

    /// Execute a multi-statement script as a single transaction.
    ///
    /// Either every statement commits or none do.
    pub fn execute_transaction(&self, sql: &str) -> Result<()> {
        self.with_transaction(|conn| Ok(conn.execute_batch(sql)?))
    }

    /// Execute one statement, returning the number of changed rows
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(conn.execute(sql, params)?)
    }

    /// Run `f` against the raw connection, outside any transaction
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        f(&conn)
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`; an `Err` drops the transaction, which
    /// rolls it back.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}
