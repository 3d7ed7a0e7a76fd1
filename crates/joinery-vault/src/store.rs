//! SQLite-backed durable storage area.
//!
//! The [`SqliteArea`] wraps a `rusqlite::Connection` holding a single
//! `entries` table. It survives process restarts and is the area Joinery uses
//! for "remember me" sessions, the OAuth state nonce and onboarding flags.
//!
//! Schema migration is automatic: calling [`SqliteArea::open`] creates the
//! table as needed.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::area::StorageArea;
use crate::error::{Result, VaultError};

/// Durable key-value area backed by SQLite.
///
/// The connection sits behind a `Mutex` because `rusqlite::Connection` is not
/// `Sync`; each operation holds the lock only for its own statements.
pub struct SqliteArea {
    conn: Mutex<Connection>,
}

impl SqliteArea {
    /// Open (or create) the area database at `path`.
    ///
    /// Parent directories are created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Database`] if the database cannot be opened,
    /// or [`VaultError::MigrationFailed`] if schema setup fails.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "opening durable storage");

        let conn = Connection::open(path)?;
        Self::configure_connection(&conn)?;
        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory area (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )?;
        Ok(())
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        tracing::debug!("running durable storage migrations");

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .map_err(|e| VaultError::MigrationFailed {
            reason: e.to_string(),
        })?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VaultError::LockPoisoned { area: "durable" })
    }
}

impl StorageArea for SqliteArea {
    fn name(&self) -> &'static str {
        "durable"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM entries WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO entries (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().timestamp()],
        )?;
        tracing::debug!(key = key, "durable entry written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM entries ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now().timestamp();
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO entries (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )?;
        }
        tx.commit()?;
        tracing::debug!(count = entries.len(), "durable batch written");
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for key in keys {
            tx.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
        }
        tx.commit()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_round_trip() {
        let area = SqliteArea::open_in_memory().unwrap();
        area.set("auth_persistent", "true").unwrap();
        assert_eq!(
            area.get("auth_persistent").unwrap().as_deref(),
            Some("true")
        );
    }

    #[test]
    fn set_overwrites_existing_value() {
        let area = SqliteArea::open_in_memory().unwrap();
        area.set("jwt_token", "first").unwrap();
        area.set("jwt_token", "second").unwrap();
        assert_eq!(area.get("jwt_token").unwrap().as_deref(), Some("second"));
        assert_eq!(area.keys().unwrap(), vec!["jwt_token"]);
    }

    #[test]
    fn batch_write_and_remove() {
        let area = SqliteArea::open_in_memory().unwrap();
        area.set_many(&[("a", "1"), ("b", "2")]).unwrap();
        assert_eq!(area.keys().unwrap(), vec!["a", "b"]);

        area.remove_many(&["a", "b", "missing"]).unwrap();
        assert!(area.keys().unwrap().is_empty());
    }

    #[test]
    fn area_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SqliteArea>();
    }
}
