//! Table-backed store on SQLite.
//!
//! The value is spread across typed columns so stale entries and whole
//! response types can be removed with a single predicate, and flags survive
//! configuration changes.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::key;
use super::store::{KeyValueStore, StoredValue};
use crate::error::CacheError;
use crate::serialization::TransformFlags;

/// Schema for the cache table. The token column is the full encoded key;
/// date columns are derived from it for structured querying.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entry (
    token TEXT PRIMARY KEY,
    date INTEGER NOT NULL,
    expiry_date INTEGER NOT NULL,
    data BLOB NOT NULL,
    type_id TEXT NOT NULL,
    is_compressed INTEGER NOT NULL,
    is_encrypted INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_entry_expiry ON cache_entry(expiry_date);
"#;

/// SQLite-backed key-value store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the database at the given path.
  pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| CacheError::store("open", &path.display().to_string(), e))?;
    }
    let conn = Connection::open(path)
      .map_err(|e| CacheError::store("open", &path.display().to_string(), e))?;
    Self::from_connection(conn)
  }

  /// Open the database at the platform data directory.
  pub fn open_default() -> Result<Self, CacheError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| {
        CacheError::store("open", "", "could not determine data directory")
      })?;
    Self::open(data_dir.join("recache").join("cache.db"))
  }

  /// In-memory database, used by tests.
  pub fn open_in_memory() -> Result<Self, CacheError> {
    let conn = Connection::open_in_memory()
      .map_err(|e| CacheError::store("open", ":memory:", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self, CacheError> {
    conn
      .execute_batch(SCHEMA)
      .map_err(|e| CacheError::store("open", "cache_entry", e))?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn conn(&self, operation: &'static str) -> Result<MutexGuard<'_, Connection>, CacheError> {
    self
      .conn
      .lock()
      .map_err(|e| CacheError::store(operation, "", format!("lock poisoned: {}", e)))
  }

  /// Dates for the typed columns, taken from the key itself.
  fn key_dates(token: &str) -> (i64, i64) {
    match key::decode(token) {
      Ok(meta) => (meta.cached_at_ms, meta.expires_at_ms),
      Err(_) => {
        warn!(token, "storing entry with undecodable token, dates zeroed");
        (0, 0)
      }
    }
  }
}

impl KeyValueStore for SqliteStore {
  fn get(&self, token: &str) -> Result<Option<StoredValue>, CacheError> {
    let conn = self.conn("get")?;
    conn
      .query_row(
        "SELECT data, type_id, is_compressed, is_encrypted FROM cache_entry WHERE token = ?",
        params![token],
        |row| {
          Ok(StoredValue {
            payload: row.get(0)?,
            type_name: row.get(1)?,
            flags: Some(TransformFlags {
              compressed: row.get(2)?,
              encrypted: row.get(3)?,
            }),
          })
        },
      )
      .optional()
      .map_err(|e| CacheError::store("get", token, e))
  }

  fn save(&self, token: &str, value: &StoredValue) -> Result<(), CacheError> {
    let (date, expiry_date) = Self::key_dates(token);
    let flags = value.flags.unwrap_or_default();
    let conn = self.conn("save")?;
    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entry
           (token, date, expiry_date, data, type_id, is_compressed, is_encrypted)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
          token,
          date,
          expiry_date,
          value.payload,
          value.type_name,
          flags.compressed,
          flags.encrypted
        ],
      )
      .map_err(|e| CacheError::store("save", token, e))?;
    Ok(())
  }

  fn delete(&self, token: &str) -> Result<(), CacheError> {
    let conn = self.conn("delete")?;
    conn
      .execute("DELETE FROM cache_entry WHERE token = ?", params![token])
      .map_err(|e| CacheError::store("delete", token, e))?;
    Ok(())
  }

  fn rename(&self, old_token: &str, new_token: &str) -> Result<(), CacheError> {
    let (date, expiry_date) = Self::key_dates(new_token);
    let conn = self.conn("rename")?;
    conn
      .execute(
        "DELETE FROM cache_entry WHERE token = ?",
        params![new_token],
      )
      .map_err(|e| CacheError::store("rename", new_token, e))?;
    conn
      .execute(
        "UPDATE cache_entry SET token = ?, date = ?, expiry_date = ? WHERE token = ?",
        params![new_token, date, expiry_date, old_token],
      )
      .map_err(|e| CacheError::store("rename", old_token, e))?;
    Ok(())
  }

  fn values(&self) -> Result<Vec<(String, StoredValue)>, CacheError> {
    let conn = self.conn("values")?;
    let mut stmt = conn
      .prepare(
        "SELECT token, data, type_id, is_compressed, is_encrypted FROM cache_entry",
      )
      .map_err(|e| CacheError::store("values", "", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          StoredValue {
            payload: row.get(1)?,
            type_name: row.get(2)?,
            flags: Some(TransformFlags {
              compressed: row.get(3)?,
              encrypted: row.get(4)?,
            }),
          },
        ))
      })
      .map_err(|e| CacheError::store("values", "", e))?;

    let mut result = Vec::new();
    for row in rows {
      result.push(row.map_err(|e| CacheError::store("values", "", e))?);
    }
    Ok(result)
  }
}
