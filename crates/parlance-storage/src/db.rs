//! Database connection management.
//!
//! A single rusqlite Connection behind a Mutex, opened in WAL mode with
//! foreign keys enforced. Migrations run on open.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use parlance_core::error::ParlanceError;

use crate::migrations;

const PRAGMAS: &str = "PRAGMA journal_mode = WAL;
     PRAGMA synchronous = NORMAL;
     PRAGMA foreign_keys = ON;";

/// Thread-safe SQLite database wrapper.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path and apply pending migrations.
    pub fn new(path: &Path) -> Result<Self, ParlanceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| ParlanceError::Storage(format!("Failed to open database: {}", e)))?;
        let db = Self::configure(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, ParlanceError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ParlanceError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self, ParlanceError> {
        conn.execute_batch(PRAGMAS)
            .map_err(|e| ParlanceError::Storage(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ParlanceError>
    where
        F: FnOnce(&Connection) -> Result<T, ParlanceError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ParlanceError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

/// Map a rusqlite error into a storage error with context.
pub(crate) fn storage_err(context: &'static str) -> impl Fn(rusqlite::Error) -> ParlanceError {
    move |e| ParlanceError::Storage(format!("{}: {}", context, e))
}
