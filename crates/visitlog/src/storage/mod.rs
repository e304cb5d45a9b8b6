//! Storage layer for visitlog.
//!
//! This module provides `SQLite`-based persistent storage for operators,
//! cameras, visitors and visits. Record-specific queries live in the
//! submodules; this module owns the connection and shared helpers.

mod cameras;
pub mod migrations;
pub mod schema;
mod users;
mod visitors;
mod visits;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{types::Type, Connection, ErrorCode};
use tracing::{debug, info};

use crate::error::{Error, Result};

pub use visitors::VisitorFilter;

/// Storage engine for visitor records.
///
/// Wraps a single `SQLite` connection. Use [`SharedStorage`] to access it
/// from async code.
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

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

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

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
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
            users: self.count_users()?,
            cameras: self.count_cameras()?,
            visitors: self.count_visitors()?,
            visitors_inside: self.count_visitors_inside()?,
            visits: self.count_visits()?,
            open_visits: self.count_open_visits()?,
            db_size_bytes,
        })
    }

    fn count(&self, sql: &str) -> Result<i64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StorageStats {
    /// Number of operator accounts.
    pub users: i64,
    /// Number of registered cameras.
    pub cameras: i64,
    /// Number of visitor records.
    pub visitors: i64,
    /// Visitors without an exit time.
    pub visitors_inside: i64,
    /// Number of photo-driven visits.
    pub visits: i64,
    /// Visits not yet checked out.
    pub open_visits: i64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// Thread-safe handle to [`Storage`] for async code.
///
/// Every call runs on the blocking thread pool while holding the connection
/// mutex.
#[derive(Debug, Clone)]
pub struct SharedStorage {
    inner: Arc<Mutex<Storage>>,
}

impl SharedStorage {
    /// Wrap an opened storage.
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self {
            inner: Arc::new(Mutex::new(storage)),
        }
    }

    /// Run `f` against the storage on a blocking thread.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or an internal error if the blocking
    /// task panicked or the mutex is poisoned.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Storage) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let storage = inner
                .lock()
                .map_err(|_| Error::internal("storage mutex poisoned"))?;
            f(&storage)
        })
        .await
        .map_err(|e| Error::internal(format!("storage task failed: {e}")))?
    }
}

/// Format a timestamp for storage.
///
/// Fixed-width UTC so that text ordering matches time ordering.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp column.
pub(crate) fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse an optional stored timestamp column.
pub(crate) fn parse_optional_timestamp(
    idx: usize,
    value: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(idx, &v)).transpose()
}

/// Whether a query failed because of a UNIQUE or FOREIGN KEY constraint.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Convert a `usize` limit to an `SQLite` integer.
pub(crate) fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
