//! SQLite-backed key-value store.
//!
//! Holds the timer snapshot, cycle state, session history and daily totals in
//! a single `kv` table. Writes made through this handle are broadcast
//! immediately; writes made by other processes are picked up by
//! [`KeyValueStore::poll_external`], which watches `PRAGMA data_version`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::broadcast;

use super::{data_dir, KeyValueStore, StoreChange, CHANGE_CHANNEL_CAPACITY};
use crate::error::StoreError;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<StoreChange>,
    /// Last observed `data_version` and the rows seen at that version.
    seen: Mutex<(i64, HashMap<String, String>)>,
}

impl SqliteStore {
    /// Open the store at `~/.config/focuskit/focuskit.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::open_at(&dir.join("focuskit.db"))
    }

    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(2))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        let version = data_version(&conn)?;
        let rows = all_rows(&conn)?;
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
            seen: Mutex::new((version, rows)),
        })
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("Failed to lock connection".into()))
    }

    fn remember(&self, key: &str, value: Option<&str>) {
        if let Ok(mut seen) = self.seen.lock() {
            match value {
                Some(v) => {
                    seen.1.insert(key.to_string(), v.to_string());
                }
                None => {
                    seen.1.remove(key);
                }
            }
        }
    }

    fn publish(&self, key: &str, value: Option<String>) {
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            value,
        });
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock_conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        {
            let conn = self.lock_conn()?;
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }
        self.remember(key, Some(value));
        self.publish(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let removed = {
            let conn = self.lock_conn()?;
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?
        };
        self.remember(key, None);
        if removed > 0 {
            self.publish(key, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn poll_external(&self) -> Result<(), StoreError> {
        let (version, rows) = {
            let conn = self.lock_conn()?;
            let version = data_version(&conn)?;
            {
                let seen = self
                    .seen
                    .lock()
                    .map_err(|_| StoreError::Unavailable("Failed to lock change cache".into()))?;
                if seen.0 == version {
                    return Ok(());
                }
            }
            (version, all_rows(&conn)?)
        };

        let mut seen = self
            .seen
            .lock()
            .map_err(|_| StoreError::Unavailable("Failed to lock change cache".into()))?;
        let mut changed = Vec::new();
        for (key, value) in &rows {
            if seen.1.get(key) != Some(value) {
                changed.push(StoreChange {
                    key: key.clone(),
                    value: Some(value.clone()),
                });
            }
        }
        for key in seen.1.keys() {
            if !rows.contains_key(key) {
                changed.push(StoreChange {
                    key: key.clone(),
                    value: None,
                });
            }
        }
        *seen = (version, rows);
        drop(seen);

        if !changed.is_empty() {
            tracing::debug!(count = changed.len(), "picked up external store writes");
        }
        for change in changed {
            let _ = self.changes.send(change);
        }
        Ok(())
    }
}

fn data_version(conn: &Connection) -> Result<i64, rusqlite::Error> {
    conn.query_row("PRAGMA data_version", [], |row| row.get(0))
}

fn all_rows(conn: &Connection) -> Result<HashMap<String, String>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM kv")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    rows.collect()
}
