//! Storage layer for bloodbank.
//!
//! This module provides `SQLite`-based persistent storage for accounts,
//! donors, inventory, requests, notifications, appointments and medical
//! reports. Queries for each record kind live in their own submodule as
//! `impl Storage` blocks; multi-step business operations wrap them in
//! [`Storage::transaction`].

mod appointments;
mod donors;
mod inventory;
pub mod migrations;
mod notifications;
mod reports;
mod requests;
pub mod schema;
mod users;

pub use appointments::NewAppointmentRow;
pub use inventory::LotChange;

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// How long a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Storage engine for the blood bank.
///
/// Provides persistent storage using `SQLite` with support for:
/// - Versioned schema migrations
/// - IMMEDIATE transactions around multi-row updates
/// - An append-only ledger of inventory movements
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets the CLI read while the server writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::configure(&conn)?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        Self::configure(&conn)?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(())
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begin an IMMEDIATE transaction.
    ///
    /// Storage methods called while the returned guard is alive run inside
    /// it. Dropping the guard without [`Transaction::commit`] rolls back.
    ///
    /// # Errors
    ///
    /// Returns an error if the write lock cannot be taken.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    fn count(&self, sql: &str) -> Result<i64> {
        Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            users: self.count("SELECT COUNT(*) FROM users")?,
            donors: self.count("SELECT COUNT(*) FROM donors")?,
            lots: self.count("SELECT COUNT(*) FROM inventory_lots")?,
            units_on_hand: self.count("SELECT COALESCE(SUM(units), 0) FROM inventory_lots")?,
            requests: self.count("SELECT COUNT(*) FROM requests")?,
            notifications: self.count("SELECT COUNT(*) FROM notifications")?,
            appointments: self.count("SELECT COUNT(*) FROM appointments")?,
            reports: self.count("SELECT COUNT(*) FROM medical_reports")?,
            schema_version: migrations::CURRENT_VERSION,
            db_size_bytes,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Accounts.
    pub users: i64,
    /// Donor profiles.
    pub donors: i64,
    /// Inventory lots, including empty and expired ones.
    pub lots: i64,
    /// Units on hand across all lots, expired ones included.
    pub units_on_hand: i64,
    /// Requests.
    pub requests: i64,
    /// Notifications sent.
    pub notifications: i64,
    /// Appointments.
    pub appointments: i64,
    /// Medical reports.
    pub reports: i64,
    /// Schema version of the database.
    pub schema_version: i32,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// Format a timestamp for storage (fixed width, so text order is time order).
pub(crate) fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Read a text column and parse it into `T`.
pub(crate) fn parsed<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e: T::Err| conversion_error(idx, &e))
}

/// Read a nullable text column and parse it into `T`.
pub(crate) fn parsed_opt<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let text: Option<String> = row.get(idx)?;
    text.map(|t| t.parse().map_err(|e: T::Err| conversion_error(idx, &e)))
        .transpose()
}

fn conversion_error(idx: usize, err: &dyn Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.to_string().into())
}

/// Convert a domain count into an SQL integer.
pub(crate) fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
