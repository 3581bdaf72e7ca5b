//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access and
//! creates the key-value table on open.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use skycast_core::error::SkycastError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);";

/// Thread-safe SQLite database wrapper.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    pub fn new(path: &Path) -> Result<Self, SkycastError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| SkycastError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| SkycastError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());
        Self::with_schema(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, SkycastError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SkycastError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        Self::with_schema(conn)
    }

    fn with_schema(conn: Connection) -> Result<Self, SkycastError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| SkycastError::Storage(format!("Failed to create schema: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, SkycastError>
    where
        F: FnOnce(&Connection) -> Result<T, SkycastError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SkycastError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Read the value stored under `key`.
    pub fn get(&self, key: &str) -> Result<Option<String>, SkycastError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SkycastError::Storage(format!("Failed to read {}: {}", key, e)))
        })
    }

    /// Overwrite the value stored under `key`.
    pub fn put(&self, key: &str, value: &str) -> Result<(), SkycastError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, value],
            )
            .map_err(|e| SkycastError::Storage(format!("Failed to write {}: {}", key, e)))?;
            Ok(())
        })
    }

    /// Remove `key`. Removing a missing key is not an error.
    pub fn remove(&self, key: &str) -> Result<(), SkycastError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])
                .map_err(|e| SkycastError::Storage(format!("Failed to remove {}: {}", key, e)))?;
            Ok(())
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_database_starts_empty() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))
                .map_err(|e| SkycastError::Storage(e.to_string()))?;
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_put_overwrites() {
        let db = Database::in_memory().unwrap();
        db.put("k", "one").unwrap();
        db.put("k", "two").unwrap();
        assert_eq!(db.get("k").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn test_remove_missing_key_is_ok() {
        let db = Database::in_memory().unwrap();
        db.remove("absent").unwrap();
        assert!(db.get("absent").unwrap().is_none());
    }

    #[test]
    fn test_file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("skycast.db");
        {
            let db = Database::new(&path).unwrap();
            db.put("k", "v").unwrap();
        }
        let db = Database::new(&path).unwrap();
        assert_eq!(db.get("k").unwrap().as_deref(), Some("v"));
    }
}
