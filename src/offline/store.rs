//! Persistent key-value store contract and its backends.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::error::PersistenceError;

/// Synchronous, process-local store that survives restarts.
///
/// Values are whole blobs; callers overwrite rather than edit in place.
pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

  fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

  fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

/// Store that lives only as long as the process.
/// Used when persistence is disabled, and in tests.
#[derive(Default)]
pub struct MemoryStore {
  values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, PersistenceError> {
    self
      .values
      .lock()
      .map_err(|e| PersistenceError::Unavailable(format!("Lock poisoned: {}", e)))
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
    Ok(self.lock()?.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
    self.lock()?.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), PersistenceError> {
    self.lock()?.remove(key);
    Ok(())
  }
}

/// SQLite-backed store, one row per key.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

/// Schema for the key-value table.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteStore {
  /// Open (or create) the store at `path`, creating parent directories.
  pub fn open(path: &Path) -> Result<Self, PersistenceError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        PersistenceError::Unavailable(format!("Failed to create store directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      PersistenceError::Unavailable(format!(
        "Failed to open store at {}: {}",
        path.display(),
        e
      ))
    })?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  fn run_migrations(&self) -> Result<(), PersistenceError> {
    self
      .lock()?
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| PersistenceError::Unavailable(format!("Failed to run migrations: {}", e)))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, PersistenceError> {
    self
      .conn
      .lock()
      .map_err(|e| PersistenceError::Unavailable(format!("Lock poisoned: {}", e)))
  }
}

impl KeyValueStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
    self
      .lock()?
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| PersistenceError::Unavailable(format!("Failed to read '{}': {}", key, e)))
  }

  fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
    self
      .lock()?
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| PersistenceError::Unavailable(format!("Failed to write '{}': {}", key, e)))?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), PersistenceError> {
    self
      .lock()?
      .execute("DELETE FROM kv_store WHERE key = ?", params![key])
      .map_err(|e| PersistenceError::Unavailable(format!("Failed to remove '{}': {}", key, e)))?;
    Ok(())
  }
}
