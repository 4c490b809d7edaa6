//! Cache store trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A persisted cache entry: JSON value plus the metadata needed to decide
/// expiry at read time.
#[derive(Debug, Clone)]
pub struct StoredEntry {
  pub key: String,
  pub value: serde_json::Value,
  /// When the value was stored
  pub stored_at: DateTime<Utc>,
  /// Time-to-live in milliseconds from `stored_at`
  pub ttl_ms: i64,
}

impl StoredEntry {
  /// An entry is never served past `stored_at + ttl`.
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    now - self.stored_at >= chrono::Duration::milliseconds(self.ttl_ms)
  }
}

/// Trait for persistent cache backends.
pub trait CacheStore: Send + Sync {
  /// Load every persisted entry, for warming the in-memory mirror.
  fn load_all(&self) -> Result<Vec<StoredEntry>>;

  /// Store an entry, replacing any previous value under the same key.
  fn put(&self, entry: &StoredEntry) -> Result<()>;

  /// Remove a single entry.
  fn remove(&self, key: &str) -> Result<()>;

  /// Remove a set of entries.
  fn remove_many(&self, keys: &[String]) -> Result<()>;

  /// Remove everything.
  fn clear(&self) -> Result<()>;
}

/// Store implementation that doesn't persist anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStore;

impl CacheStore for NoopStore {
  fn load_all(&self) -> Result<Vec<StoredEntry>> {
    Ok(Vec::new()) // Nothing persisted
  }

  fn put(&self, _entry: &StoredEntry) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn remove_many(&self, _keys: &[String]) -> Result<()> {
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }
}

/// SQLite-based cache store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Create a new SQLite store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Create a new SQLite store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("boh").join("cache.db"))
  }

  /// Run database migrations for the cache table.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the cache table.
const CACHE_SCHEMA: &str = r#"
-- Key-value cache (stores serialized JSON with per-entry TTL)
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    stored_at TEXT NOT NULL,
    ttl_ms INTEGER NOT NULL
);
"#;

impl CacheStore for SqliteStore {
  fn load_all(&self) -> Result<Vec<StoredEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT key, value, stored_at, ttl_ms FROM cache_entries")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(String, Vec<u8>, String, i64)> = stmt
      .query_map([], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .map_err(|e| eyre!("Failed to query cache entries: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    let mut entries = Vec::with_capacity(rows.len());
    for (key, value, stored_at, ttl_ms) in rows {
      // Undecodable rows are skipped rather than failing the warm-up
      let Ok(value) = serde_json::from_slice(&value) else {
        continue;
      };
      let Ok(stored_at) = parse_datetime(&stored_at) else {
        continue;
      };
      entries.push(StoredEntry {
        key,
        value,
        stored_at,
        ttl_ms,
      });
    }

    Ok(entries)
  }

  fn put(&self, entry: &StoredEntry) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let value =
      serde_json::to_vec(&entry.value).map_err(|e| eyre!("Failed to serialize entry: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries (key, value, stored_at, ttl_ms)
         VALUES (?, ?, ?, ?)",
        params![entry.key, value, entry.stored_at.to_rfc3339(), entry.ttl_ms],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM cache_entries WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove cache entry: {}", e))?;

    Ok(())
  }

  fn remove_many(&self, keys: &[String]) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for key in keys {
      conn
        .execute("DELETE FROM cache_entries WHERE key = ?", params![key])
        .map_err(|e| eyre!("Failed to remove cache entry: {}", e))?;
    }

    conn
      .execute("COMMIT", [])
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM cache_entries", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;

    Ok(())
  }
}

/// Parse a datetime string stored in RFC 3339 format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  fn entry(key: &str, ttl_ms: i64) -> StoredEntry {
    StoredEntry {
      key: key.to_string(),
      value: serde_json::json!({"n": 1}),
      stored_at: Utc::now(),
      ttl_ms,
    }
  }

  #[test]
  fn put_load_roundtrip() {
    let td = tempdir().unwrap();
    let store = SqliteStore::open_at(&td.path().join("cache.db")).unwrap();

    store.put(&entry("a", 60_000)).unwrap();
    store.put(&entry("b", 60_000)).unwrap();

    let mut keys: Vec<String> = store.load_all().unwrap().into_iter().map(|e| e.key).collect();
    keys.sort();
    assert_eq!(keys, vec!["a", "b"]);
  }

  #[test]
  fn put_overwrites_existing_key() {
    let td = tempdir().unwrap();
    let store = SqliteStore::open_at(&td.path().join("cache.db")).unwrap();

    store.put(&entry("a", 60_000)).unwrap();
    let mut updated = entry("a", 60_000);
    updated.value = serde_json::json!({"n": 2});
    store.put(&updated).unwrap();

    let entries = store.load_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].value, serde_json::json!({"n": 2}));
  }

  #[test]
  fn remove_many_deletes_only_listed_keys() {
    let td = tempdir().unwrap();
    let store = SqliteStore::open_at(&td.path().join("cache.db")).unwrap();

    store.put(&entry("a", 60_000)).unwrap();
    store.put(&entry("b", 60_000)).unwrap();
    store.put(&entry("c", 60_000)).unwrap();

    store
      .remove_many(&["a".to_string(), "c".to_string()])
      .unwrap();

    let entries = store.load_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, "b");
  }

  #[test]
  fn expiry_is_based_on_stored_at_plus_ttl() {
    let mut e = entry("a", 1_000);
    let now = e.stored_at;
    assert!(!e.is_expired(now));
    assert!(e.is_expired(now + chrono::Duration::milliseconds(1_000)));

    e.ttl_ms = 0;
    assert!(e.is_expired(now));
  }
}
