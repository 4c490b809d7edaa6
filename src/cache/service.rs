//! Cache service: in-memory mirror over a persistent store.
//!
//! Reads are synchronous against the mirror once `warm_up` has run; writes
//! update the mirror immediately and persist in the background. The cache is
//! an optimization, never a correctness dependency: every store failure is
//! absorbed here and degrades to a miss, since any cached value can be
//! re-derived from the network source of truth.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use super::store::{CacheStore, NoopStore, StoredEntry};

/// A single in-memory cache entry.
#[derive(Debug, Clone)]
struct CacheEntry {
  value: serde_json::Value,
  stored_at: DateTime<Utc>,
  ttl_ms: i64,
}

impl CacheEntry {
  fn is_expired(&self, now: DateTime<Utc>) -> bool {
    now - self.stored_at >= chrono::Duration::milliseconds(self.ttl_ms)
  }
}

/// Process-wide TTL cache, constructed once at startup and passed by
/// reference to every consumer that needs it.
pub struct CacheService {
  entries: Mutex<HashMap<String, CacheEntry>>,
  store: Arc<dyn CacheStore>,
}

impl CacheService {
  /// Create a cache backed by the given persistent store.
  pub fn new(store: Arc<dyn CacheStore>) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      store,
    }
  }

  /// Create a purely in-memory cache (no persistence).
  pub fn in_memory() -> Self {
    Self::new(Arc::new(NoopStore))
  }

  /// Bulk-load persisted entries into the in-memory mirror.
  ///
  /// Must run before the first `get` that expects data from a previous
  /// process. Expired rows are dropped on the way in; a store failure leaves
  /// the mirror empty and is logged, not surfaced.
  pub fn warm_up(&self) {
    let loaded = match self.store.load_all() {
      Ok(entries) => entries,
      Err(e) => {
        warn!("Cache warm-up failed, starting cold: {}", e);
        return;
      }
    };

    let now = Utc::now();
    let mut entries = self.entries.lock().expect("cache lock poisoned");
    let mut kept = 0usize;
    for stored in loaded {
      if stored.is_expired(now) {
        continue;
      }
      kept += 1;
      entries.insert(
        stored.key,
        CacheEntry {
          value: stored.value,
          stored_at: stored.stored_at,
          ttl_ms: stored.ttl_ms,
        },
      );
    }
    debug!("Cache warmed with {} entries", kept);
  }

  /// Read a value from the mirror.
  ///
  /// Returns `None` when the key is absent, expired, or fails to decode as
  /// `T`. Expired entries are pruned on the way out.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let mut entries = self.entries.lock().expect("cache lock poisoned");

    let expired = match entries.get(key) {
      Some(entry) => entry.is_expired(Utc::now()),
      None => return None,
    };

    if expired {
      entries.remove(key);
      drop(entries);
      self.remove_persisted(vec![key.to_string()]);
      return None;
    }

    let entry = entries.get(key).expect("checked above");
    match serde_json::from_value(entry.value.clone()) {
      Ok(value) => Some(value),
      Err(e) => {
        // A value of the wrong shape is as good as absent
        warn!("Dropping undecodable cache entry '{}': {}", key, e);
        entries.remove(key);
        None
      }
    }
  }

  /// Store a value under the key, overwriting any existing entry.
  ///
  /// The mirror is updated synchronously; persistence happens in the
  /// background and its failure is swallowed.
  pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
    let value = match serde_json::to_value(value) {
      Ok(v) => v,
      Err(e) => {
        warn!("Failed to serialize cache value for '{}': {}", key, e);
        return;
      }
    };

    let entry = CacheEntry {
      value: value.clone(),
      stored_at: Utc::now(),
      ttl_ms: ttl.as_millis() as i64,
    };

    self
      .entries
      .lock()
      .expect("cache lock poisoned")
      .insert(key.to_string(), entry.clone());

    let stored = StoredEntry {
      key: key.to_string(),
      value,
      stored_at: entry.stored_at,
      ttl_ms: entry.ttl_ms,
    };
    let store = Arc::clone(&self.store);
    run_in_background(move || {
      if let Err(e) = store.put(&stored) {
        warn!("Failed to persist cache entry '{}': {}", stored.key, e);
      }
    });
  }

  /// Return the cached value if valid, otherwise invoke the fetcher, store
  /// its result, and return it.
  ///
  /// Concurrent calls for the same key while a fetch is in flight are not
  /// deduplicated: each caller may trigger its own network call. The reads
  /// behind this cache are idempotent and the last write wins.
  pub async fn get_or_fetch<T, F, Fut>(
    &self,
    key: &str,
    ttl: Duration,
    force_refresh: bool,
    fetch: F,
  ) -> Result<T>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    if !force_refresh {
      if let Some(value) = self.get::<T>(key) {
        return Ok(value);
      }
    }

    let value = fetch().await?;
    self.set(key, &value, ttl);
    Ok(value)
  }

  /// Remove a single key from the mirror and the store.
  pub fn invalidate(&self, key: &str) {
    self
      .entries
      .lock()
      .expect("cache lock poisoned")
      .remove(key);
    self.remove_persisted(vec![key.to_string()]);
  }

  /// Remove every key matching the pattern.
  ///
  /// Used when a mutating operation must drop a whole family of keys, e.g.
  /// every cached page of one endpoint.
  pub fn invalidate_pattern(&self, pattern: &Regex) {
    let removed: Vec<String> = {
      let mut entries = self.entries.lock().expect("cache lock poisoned");
      let keys: Vec<String> = entries
        .keys()
        .filter(|k| pattern.is_match(k))
        .cloned()
        .collect();
      for key in &keys {
        entries.remove(key);
      }
      keys
    };

    if !removed.is_empty() {
      debug!("Invalidated {} cache entries", removed.len());
      self.remove_persisted(removed);
    }
  }

  /// Drop everything, mirror and store.
  pub fn clear(&self) {
    self.entries.lock().expect("cache lock poisoned").clear();
    let store = Arc::clone(&self.store);
    run_in_background(move || {
      if let Err(e) = store.clear() {
        warn!("Failed to clear cache store: {}", e);
      }
    });
  }

  /// Number of (possibly expired) entries currently mirrored.
  pub fn len(&self) -> usize {
    self.entries.lock().expect("cache lock poisoned").len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn remove_persisted(&self, keys: Vec<String>) {
    let store = Arc::clone(&self.store);
    run_in_background(move || {
      if let Err(e) = store.remove_many(&keys) {
        warn!("Failed to remove persisted cache entries: {}", e);
      }
    });
  }
}

/// Run a store operation off the caller's path. Inside a tokio runtime the
/// work goes to the blocking pool; outside one it runs inline.
fn run_in_background<F: FnOnce() + Send + 'static>(f: F) {
  match tokio::runtime::Handle::try_current() {
    Ok(handle) => {
      handle.spawn_blocking(f);
    }
    Err(_) => f(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::store::SqliteStore;
  use color_eyre::eyre::eyre;
  use tempfile::tempdir;

  /// Store that fails every operation, for exercising absorption.
  struct BrokenStore;

  impl CacheStore for BrokenStore {
    fn load_all(&self) -> Result<Vec<StoredEntry>> {
      Err(eyre!("disk on fire"))
    }
    fn put(&self, _entry: &StoredEntry) -> Result<()> {
      Err(eyre!("disk on fire"))
    }
    fn remove(&self, _key: &str) -> Result<()> {
      Err(eyre!("disk on fire"))
    }
    fn remove_many(&self, _keys: &[String]) -> Result<()> {
      Err(eyre!("disk on fire"))
    }
    fn clear(&self) -> Result<()> {
      Err(eyre!("disk on fire"))
    }
  }

  #[test]
  fn set_then_get_within_ttl() {
    let cache = CacheService::in_memory();
    cache.set("orders_page1", &vec![1, 2, 3, 4, 5], Duration::from_secs(60));

    let got: Option<Vec<i32>> = cache.get("orders_page1");
    assert_eq!(got, Some(vec![1, 2, 3, 4, 5]));
  }

  #[test]
  fn get_after_expiry_is_absent() {
    let cache = CacheService::in_memory();
    cache.set("k", &"v", Duration::from_millis(20));

    assert_eq!(cache.get::<String>("k"), Some("v".to_string()));
    std::thread::sleep(Duration::from_millis(40));
    assert_eq!(cache.get::<String>("k"), None);
  }

  #[test]
  fn set_overwrites_previous_entry() {
    let cache = CacheService::in_memory();
    cache.set("k", &1, Duration::from_secs(60));
    cache.set("k", &2, Duration::from_secs(60));
    assert_eq!(cache.get::<i32>("k"), Some(2));
  }

  #[test]
  fn invalidate_pattern_removes_key_family() {
    let cache = CacheService::in_memory();
    cache.set("list:orders?page=1", &1, Duration::from_secs(60));
    cache.set("list:orders?page=2", &2, Duration::from_secs(60));
    cache.set("list:products?page=1", &3, Duration::from_secs(60));

    cache.invalidate_pattern(&Regex::new(r"^list:orders\?").unwrap());

    assert_eq!(cache.get::<i32>("list:orders?page=1"), None);
    assert_eq!(cache.get::<i32>("list:orders?page=2"), None);
    assert_eq!(cache.get::<i32>("list:products?page=1"), Some(3));
  }

  #[test]
  fn warm_up_restores_unexpired_entries() {
    let td = tempdir().unwrap();
    let path = td.path().join("cache.db");

    {
      let cache = CacheService::new(Arc::new(SqliteStore::open_at(&path).unwrap()));
      cache.set("keep", &"yes", Duration::from_secs(60));
      cache.set("drop", &"no", Duration::from_millis(1));
    }
    std::thread::sleep(Duration::from_millis(10));

    // Fresh process: cold until warmed
    let cache = CacheService::new(Arc::new(SqliteStore::open_at(&path).unwrap()));
    assert_eq!(cache.get::<String>("keep"), None);

    cache.warm_up();
    assert_eq!(cache.get::<String>("keep"), Some("yes".to_string()));
    assert_eq!(cache.get::<String>("drop"), None);
  }

  #[test]
  fn store_failures_degrade_to_misses() {
    let cache = CacheService::new(Arc::new(BrokenStore));

    cache.warm_up();
    assert!(cache.is_empty());

    // Mirror still works even though nothing persists
    cache.set("k", &1, Duration::from_secs(60));
    assert_eq!(cache.get::<i32>("k"), Some(1));
    cache.invalidate("k");
    assert_eq!(cache.get::<i32>("k"), None);
  }

  #[tokio::test]
  async fn get_or_fetch_uses_cache_until_forced() {
    let cache = CacheService::in_memory();
    let ttl = Duration::from_secs(60);

    let v = cache
      .get_or_fetch("k", ttl, false, || async { Ok(1) })
      .await
      .unwrap();
    assert_eq!(v, 1);

    // Second call never reaches the fetcher
    let v: i32 = cache
      .get_or_fetch("k", ttl, false, || async { Err(eyre!("should not fetch")) })
      .await
      .unwrap();
    assert_eq!(v, 1);

    // force_refresh bypasses the valid entry
    let v = cache
      .get_or_fetch("k", ttl, true, || async { Ok(2) })
      .await
      .unwrap();
    assert_eq!(v, 2);
    assert_eq!(cache.get::<i32>("k"), Some(2));
  }

  #[tokio::test]
  async fn get_or_fetch_error_leaves_cache_untouched() {
    let cache = CacheService::in_memory();
    let result: Result<i32> = cache
      .get_or_fetch("k", Duration::from_secs(60), false, || async {
        Err(eyre!("network down"))
      })
      .await;

    assert!(result.is_err());
    assert_eq!(cache.get::<i32>("k"), None);
  }
}
