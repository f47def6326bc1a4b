//! Cache persistence: combines the key codec, the key-value store and the
//! serialization manager into cache/read/invalidate/clear operations.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{debug, warn};

use super::key::{self, KeyMeta};
use super::store::{KeyValueStore, StoredValue};
use super::CacheRecord;
use crate::clock::Clock;
use crate::error::CacheError;
use crate::serialization::SerializationManager;
use crate::token::{Operation, RequestMetadata};

/// A stored entry located by request hash.
struct Located {
  token: String,
  meta: KeyMeta,
  value: StoredValue,
}

/// The dates written into a new entry's key, millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredDates {
  pub cached_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

pub struct PersistenceManager {
  store: Arc<dyn KeyValueStore>,
  serializer: Arc<SerializationManager>,
  clock: Arc<dyn Clock>,
}

impl PersistenceManager {
  pub fn new(
    store: Arc<dyn KeyValueStore>,
    serializer: Arc<SerializationManager>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    Self {
      store,
      serializer,
      clock,
    }
  }

  /// Persist a response, replacing any existing entry for the same request
  /// hash so at most one entry per hash exists. Returns the dates written
  /// into the key so emitted tokens report exactly what was stored.
  ///
  /// The delete-then-save pair is not atomic; a reader racing between the
  /// two sees a transient miss.
  pub fn cache(
    &self,
    value: &(dyn Any + Send + Sync),
    operation: &Operation,
    metadata: &RequestMetadata,
  ) -> Result<StoredDates, CacheError> {
    let payload =
      self
        .serializer
        .serialize(value, &metadata.response_type_id, operation, None)?;

    if let Some(existing) = self.locate(&metadata.request_hash)? {
      self.store.delete(&existing.token)?;
    }

    let now = self.clock.now();
    let ttl = operation.ttl().unwrap_or_else(Duration::zero);
    let cached_at_ms = now.timestamp_millis();
    let expires_at_ms = (now + ttl).timestamp_millis();
    let token = key::encode(&KeyMeta {
      request_hash: metadata.request_hash.clone(),
      response_type_hash: metadata.response_type_hash.clone(),
      cached_at_ms,
      expires_at_ms,
    });

    debug!(
      request_hash = %metadata.request_hash,
      type_id = %metadata.response_type_id,
      size = payload.len(),
      "caching response"
    );

    self.store.save(
      &token,
      &StoredValue {
        type_name: metadata.response_type_id.clone(),
        payload,
        flags: Some(self.serializer.transform_flags()),
      },
    )?;

    Ok(StoredDates {
      cached_at: ms_to_datetime(cached_at_ms).unwrap_or(now),
      expires_at: ms_to_datetime(expires_at_ms).unwrap_or(now + ttl),
    })
  }

  /// Fetch the stored entry for a request, complete (with payload) or
  /// metadata-only. `None` if absent.
  pub fn get_record(
    &self,
    metadata: &RequestMetadata,
    with_payload: bool,
  ) -> Result<Option<CacheRecord>, CacheError> {
    let Some(located) = self.locate(&metadata.request_hash)? else {
      return Ok(None);
    };
    Ok(self.record_from(located, with_payload))
  }

  /// Decode a complete record's payload back into a typed response.
  pub fn decode_record(
    &self,
    record: &CacheRecord,
    operation: &Operation,
  ) -> Result<Box<dyn Any + Send + Sync>, CacheError> {
    let payload = record.payload.as_ref().ok_or_else(|| {
      CacheError::serialization(
        "decode",
        &record.response_type_name,
        "record holds no payload",
      )
    })?;
    self.serializer.deserialize(
      &record.response_type_name,
      operation,
      payload.clone(),
      None,
    )
  }

  /// Force the stored entry for a request to expire by rewriting its key
  /// with a zero expiry date.
  ///
  /// Returns `false` when nothing is stored or the entry is already
  /// invalidated; repeating the call is an explicit no-op, not an error.
  pub fn force_invalidation(&self, metadata: &RequestMetadata) -> Result<bool, CacheError> {
    let Some(located) = self.locate(&metadata.request_hash)? else {
      return Ok(false);
    };
    if located.meta.expires_at_ms == 0 {
      return Ok(false);
    }

    let invalidated = key::encode(&KeyMeta {
      expires_at_ms: 0,
      ..located.meta
    });
    self.store.rename(&located.token, &invalidated)?;
    debug!(request_hash = %metadata.request_hash, "entry invalidated");
    Ok(true)
  }

  /// Remove stored entries matching the type filter and, when `stale_only`,
  /// only those already expired. Full scan; returns the number removed.
  pub fn clear_cache(
    &self,
    type_filter: Option<&str>,
    stale_only: bool,
  ) -> Result<usize, CacheError> {
    let now_ms = self.clock.now().timestamp_millis();
    let mut removed = 0;

    for (token, value) in self.store.values()? {
      let Some(meta) = decode_scanned(&token) else {
        continue;
      };
      if let Some(filter) = type_filter {
        if value.type_name != filter {
          continue;
        }
      }
      if stale_only && meta.expires_at_ms > now_ms {
        continue;
      }
      self.store.delete(&token)?;
      removed += 1;
    }

    debug!(removed, stale_only, "cache cleared");
    Ok(removed)
  }

  /// Metadata-only records for every valid stored entry. Scanning basis for
  /// the statistics view.
  pub fn records(&self) -> Result<Vec<CacheRecord>, CacheError> {
    let mut records = Vec::new();
    for (token, value) in self.store.values()? {
      let Some(meta) = decode_scanned(&token) else {
        continue;
      };
      if let Some(record) = self.build_record(meta, value, false) {
        records.push(record);
      }
    }
    Ok(records)
  }

  fn locate(&self, request_hash: &str) -> Result<Option<Located>, CacheError> {
    for (token, value) in self.store.values()? {
      let Some(meta) = decode_scanned(&token) else {
        continue;
      };
      if meta.request_hash == request_hash {
        return Ok(Some(Located { token, meta, value }));
      }
    }
    Ok(None)
  }

  fn record_from(&self, located: Located, with_payload: bool) -> Option<CacheRecord> {
    self.build_record(located.meta, located.value, with_payload)
  }

  fn build_record(
    &self,
    meta: KeyMeta,
    value: StoredValue,
    with_payload: bool,
  ) -> Option<CacheRecord> {
    let cached_at = ms_to_datetime(meta.cached_at_ms)?;
    let expires_at = ms_to_datetime(meta.expires_at_ms)?;
    let flags = value
      .flags
      .unwrap_or_else(|| self.serializer.transform_flags());
    Some(CacheRecord {
      request_hash: meta.request_hash,
      response_type_hash: meta.response_type_hash,
      response_type_name: value.type_name,
      cached_at,
      expires_at,
      payload: with_payload.then_some(value.payload),
      is_compressed: flags.compressed,
      is_encrypted: flags.encrypted,
    })
  }
}

/// Decode a key during a scan; malformed or foreign keys are skipped, never
/// raised.
fn decode_scanned(token: &str) -> Option<KeyMeta> {
  if !key::is_valid_format(token) {
    return None;
  }
  match key::decode(token) {
    Ok(meta) => Some(meta),
    Err(e) => {
      warn!(token, "skipping undecodable cache key: {}", e);
      None
    }
  }
}

fn ms_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
  Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::Clock;
  use crate::priority::{CacheMode, CachePreference, CachePriority};
  use crate::serialization::{CodecRegistry, SerializationManager};
  use crate::persistence::store::FileStore;
  use serde::{Deserialize, Serialize};
  use std::sync::Mutex;
  use tempfile::TempDir;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct User {
    id: u64,
    name: String,
  }

  struct FixedClock(Mutex<DateTime<Utc>>);

  impl FixedClock {
    fn at_ms(ms: i64) -> Arc<Self> {
      Arc::new(Self(Mutex::new(Utc.timestamp_millis_opt(ms).unwrap())))
    }

    fn advance(&self, by: Duration) {
      let mut now = self.0.lock().unwrap();
      *now += by;
    }
  }

  impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
      *self.0.lock().unwrap()
    }
  }

  fn manager(clock: Arc<FixedClock>) -> (TempDir, PersistenceManager) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let mut registry = CodecRegistry::new();
    registry.register::<User>("app.User");
    let serializer = Arc::new(SerializationManager::new(registry, vec![]));
    (dir, PersistenceManager::new(store, serializer, clock))
  }

  fn cache_operation(ttl_ms: i64) -> Operation {
    Operation::Cache {
      priority: CachePriority::new(CacheMode::Cache, CachePreference::Default),
      ttl: Duration::milliseconds(ttl_ms),
    }
  }

  fn metadata(hash: &str) -> RequestMetadata {
    RequestMetadata::new(hash, "app.User")
  }

  fn user(id: u64) -> User {
    User {
      id,
      name: format!("user-{}", id),
    }
  }

  #[test]
  fn test_cache_then_read_round_trips() {
    let clock = FixedClock::at_ms(1_000);
    let (_dir, manager) = manager(clock);
    let operation = cache_operation(60_000);
    let meta = metadata("abc");

    manager.cache(&user(1), &operation, &meta).unwrap();

    let record = manager.get_record(&meta, true).unwrap().unwrap();
    assert_eq!(record.request_hash, "abc");
    assert_eq!(record.response_type_name, "app.User");
    assert_eq!(record.cached_at.timestamp_millis(), 1_000);
    assert_eq!(record.expires_at.timestamp_millis(), 61_000);

    let value = manager.decode_record(&record, &operation).unwrap();
    assert_eq!(*value.downcast::<User>().unwrap(), user(1));
  }

  #[test]
  fn test_cache_reports_the_written_dates() {
    let clock = FixedClock::at_ms(1_000);
    let (_dir, manager) = manager(clock);
    let meta = metadata("abc");
    let dates = manager
      .cache(&user(1), &cache_operation(60_000), &meta)
      .unwrap();

    let record = manager.get_record(&meta, false).unwrap().unwrap();
    assert_eq!(dates.cached_at, record.cached_at);
    assert_eq!(dates.expires_at, record.expires_at);
  }

  #[test]
  fn test_at_most_one_entry_per_hash() {
    let clock = FixedClock::at_ms(1_000);
    let (_dir, manager) = manager(clock.clone());
    let operation = cache_operation(60_000);
    let meta = metadata("abc");

    manager.cache(&user(1), &operation, &meta).unwrap();
    clock.advance(Duration::milliseconds(10));
    manager.cache(&user(2), &operation, &meta).unwrap();
    clock.advance(Duration::milliseconds(10));
    manager.cache(&user(3), &operation, &meta).unwrap();

    assert_eq!(manager.records().unwrap().len(), 1);
    let record = manager.get_record(&meta, true).unwrap().unwrap();
    let value = manager.decode_record(&record, &operation).unwrap();
    assert_eq!(*value.downcast::<User>().unwrap(), user(3));
  }

  #[test]
  fn test_separator_in_request_hash_keeps_one_entry() {
    let clock = FixedClock::at_ms(1_000);
    let (_dir, manager) = manager(clock.clone());
    let operation = cache_operation(60_000);
    // Raw identifiers containing the key separator are re-hashed on
    // construction, so repeated writes still replace a single entry.
    let meta = metadata("users_page_1");

    manager.cache(&user(1), &operation, &meta).unwrap();
    clock.advance(Duration::milliseconds(10));
    manager.cache(&user(2), &operation, &meta).unwrap();

    assert_eq!(manager.records().unwrap().len(), 1);
    let record = manager.get_record(&meta, true).unwrap().unwrap();
    let value = manager.decode_record(&record, &operation).unwrap();
    assert_eq!(*value.downcast::<User>().unwrap(), user(2));
  }

  #[test]
  fn test_metadata_only_record_has_no_payload() {
    let clock = FixedClock::at_ms(1_000);
    let (_dir, manager) = manager(clock);
    let meta = metadata("abc");
    manager.cache(&user(1), &cache_operation(60_000), &meta).unwrap();

    let record = manager.get_record(&meta, false).unwrap().unwrap();
    assert!(record.payload.is_none());
    assert!(matches!(
      manager.decode_record(&record, &cache_operation(60_000)),
      Err(CacheError::Serialization { .. })
    ));
  }

  #[test]
  fn test_get_record_missing_hash_is_none() {
    let clock = FixedClock::at_ms(1_000);
    let (_dir, manager) = manager(clock);
    assert!(manager.get_record(&metadata("nope"), true).unwrap().is_none());
  }

  #[test]
  fn test_force_invalidation_is_idempotent() {
    let clock = FixedClock::at_ms(1_000);
    let (_dir, manager) = manager(clock);
    let meta = metadata("abc");
    manager.cache(&user(1), &cache_operation(60_000), &meta).unwrap();

    assert!(manager.force_invalidation(&meta).unwrap());
    let record = manager.get_record(&meta, false).unwrap().unwrap();
    assert_eq!(record.expires_at.timestamp_millis(), 0);

    // Already invalidated: reports false, not an error.
    assert!(!manager.force_invalidation(&meta).unwrap());
  }

  #[test]
  fn test_force_invalidation_without_entry_is_false() {
    let clock = FixedClock::at_ms(1_000);
    let (_dir, manager) = manager(clock);
    assert!(!manager.force_invalidation(&metadata("nope")).unwrap());
  }

  #[test]
  fn test_clear_cache_stale_only() {
    let clock = FixedClock::at_ms(1_000);
    let (_dir, manager) = manager(clock.clone());

    manager
      .cache(&user(1), &cache_operation(10), &metadata("stale"))
      .unwrap();
    manager
      .cache(&user(2), &cache_operation(60_000), &metadata("fresh"))
      .unwrap();
    clock.advance(Duration::milliseconds(100));

    let removed = manager.clear_cache(None, true).unwrap();
    assert_eq!(removed, 1);

    assert!(manager.get_record(&metadata("stale"), false).unwrap().is_none());
    assert!(manager.get_record(&metadata("fresh"), false).unwrap().is_some());
  }

  #[test]
  fn test_clear_cache_by_type() {
    let clock = FixedClock::at_ms(1_000);
    let (_dir, manager) = manager(clock);
    manager
      .cache(&user(1), &cache_operation(60_000), &metadata("abc"))
      .unwrap();

    assert_eq!(manager.clear_cache(Some("app.Other"), false).unwrap(), 0);
    assert_eq!(manager.clear_cache(Some("app.User"), false).unwrap(), 1);
    assert!(manager.get_record(&metadata("abc"), false).unwrap().is_none());
  }

  #[test]
  fn test_scans_skip_foreign_keys() {
    let clock = FixedClock::at_ms(1_000);
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let serializer = Arc::new(SerializationManager::new(CodecRegistry::new(), vec![]));
    let manager = PersistenceManager::new(store.clone(), serializer, clock);

    store
      .save(
        "not-a-cache-key",
        &StoredValue {
          type_name: "foreign".to_string(),
          payload: b"bytes".to_vec(),
          flags: None,
        },
      )
      .unwrap();

    assert!(manager.records().unwrap().is_empty());
    assert_eq!(manager.clear_cache(None, false).unwrap(), 0);
    assert!(store.get("not-a-cache-key").unwrap().is_some());
  }
}
