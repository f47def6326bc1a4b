//! Durable persistence of cached responses: key codec, pluggable key-value
//! backends, and the manager tying them to the serialization pipeline.

pub mod key;
pub mod manager;
pub mod sqlite;
pub mod stats;
pub mod store;

pub use manager::{PersistenceManager, StoredDates};
pub use sqlite::SqliteStore;
pub use stats::{CacheEntry, StatisticsCompiler};
pub use store::{FileStore, KeyValueStore, StoredValue};

use chrono::{DateTime, Utc};

/// A stored cache entry.
///
/// Complete records carry the payload; metadata-only records (payload
/// `None`) back enumeration and statistics without reading response bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
  pub request_hash: String,
  pub response_type_hash: String,
  pub response_type_name: String,
  pub cached_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
  pub payload: Option<Vec<u8>>,
  pub is_compressed: bool,
  pub is_encrypted: bool,
}

impl CacheRecord {
  /// Whether the entry has expired relative to `now`.
  pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
    self.expires_at <= now
  }

  /// Whether the entry was forcibly invalidated (zero expiry date).
  pub fn is_invalidated(&self) -> bool {
    self.expires_at.timestamp_millis() == 0
  }
}
