//! Operations, request metadata and the tokens attached to emitted results.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::error::NetworkError;
use crate::priority::CachePriority;

/// A cache operation submitted by the caller.
///
/// Operations carry no mutable state; identity is by value. `Cache` is the
/// only fetch-capable variant; `Invalidate` and `Clear` are administrative
/// and bypass the freshness logic entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
  /// Fetch-capable read governed by a freshness priority. `ttl` determines
  /// the expiry date written alongside a successful response.
  Cache {
    priority: CachePriority,
    ttl: Duration,
  },
  /// Mark the stored entry for this request as expired without removing it.
  Invalidate,
  /// Remove stored entries, optionally restricted to one response type
  /// and/or to entries that are already stale.
  Clear {
    type_filter: Option<String>,
    stale_only: bool,
  },
}

impl Operation {
  /// The time-to-live for cacheable operations, `None` otherwise.
  pub fn ttl(&self) -> Option<Duration> {
    match self {
      Self::Cache { ttl, .. } => Some(*ttl),
      _ => None,
    }
  }
}

/// Freshness status attached to an emitted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStatus {
  /// Stored data, not yet expired. Terminal; no fetch follows.
  Fresh,
  /// Stored data past its expiry. Non-terminal when a refresh attempt
  /// follows, terminal in offline mode.
  Stale,
  /// Network data with no prior stored entry.
  Network,
  /// Network data replacing a stored entry.
  Refreshed,
  /// The refresh attempt failed; stale stored data is served instead.
  CouldNotRefresh,
  /// No data available under the requested policy. A valid outcome, not an
  /// error.
  Empty,
}

impl CacheStatus {
  /// Whether this status concludes the emission sequence for a request.
  pub fn is_final(&self, attempts_refresh: bool) -> bool {
    match self {
      Self::Stale => !attempts_refresh,
      _ => true,
    }
  }
}

/// Identifies one logical cached resource and its response type.
///
/// `request_hash` is the cache's logical key: at most one stored entry
/// exists per hash at any time. Hashes embed verbatim in storage keys, so
/// construction re-hashes any value that is not plain ASCII alphanumeric
/// (see [`RequestMetadata::hash_of`]); equal inputs still map to one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMetadata {
  pub request_hash: String,
  pub response_type_id: String,
  pub response_type_hash: String,
}

impl RequestMetadata {
  pub fn new(
    request_hash: impl Into<String>,
    response_type_id: impl Into<String>,
  ) -> Self {
    let response_type_id = response_type_id.into();
    let response_type_hash = Self::hash_of(&[&response_type_id]);
    Self {
      request_hash: Self::key_safe(request_hash.into()),
      response_type_id,
      response_type_hash,
    }
  }

  // The storage key codec splits on '_' and the file backend uses keys as
  // file names, so only plain alphanumeric hashes may pass through as-is.
  fn key_safe(hash: String) -> String {
    if !hash.is_empty() && hash.bytes().all(|b| b.is_ascii_alphanumeric()) {
      hash
    } else {
      Self::hash_of(&[&hash])
    }
  }

  /// Build a stable hex hash from request parts (URL, query, body, ...).
  pub fn hash_of(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
      hasher.update(part.as_bytes());
      hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
  }
}

/// Metadata attached to every emitted result.
///
/// Tokens are value objects: each emission carries its own token, produced
/// fresh rather than mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheToken {
  pub operation: Operation,
  pub metadata: RequestMetadata,
  pub status: CacheStatus,
  /// When the served data was cached, if any data is attached.
  pub cached_at: Option<DateTime<Utc>>,
  /// When the served data expires, if any data is attached.
  pub expires_at: Option<DateTime<Utc>>,
}

/// What a single emission carries alongside its token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<R> {
  /// A response, from the store or from the network.
  Data(R),
  /// No data available; carries the network failure when one caused it.
  Empty(Option<NetworkError>),
  /// An administrative operation completed; `affected` reports whether any
  /// stored entry was touched.
  Acknowledged { affected: bool },
}

/// One emitted result: token plus outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent<R> {
  pub token: CacheToken,
  pub outcome: Outcome<R>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hash_of_is_stable_and_hex() {
    let a = RequestMetadata::hash_of(&["GET", "/users", "page=1"]);
    let b = RequestMetadata::hash_of(&["GET", "/users", "page=1"]);
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn test_hash_of_separates_parts() {
    // "ab" + "c" must not collide with "a" + "bc"
    let a = RequestMetadata::hash_of(&["ab", "c"]);
    let b = RequestMetadata::hash_of(&["a", "bc"]);
    assert_ne!(a, b);
  }

  #[test]
  fn test_unsafe_request_hash_is_rehashed() {
    let meta = RequestMetadata::new("users_page_1", "app.User");
    assert_eq!(meta.request_hash, RequestMetadata::hash_of(&["users_page_1"]));
    assert!(meta.request_hash.bytes().all(|b| b.is_ascii_alphanumeric()));
    // Same input, same entry.
    assert_eq!(
      meta.request_hash,
      RequestMetadata::new("users_page_1", "app.User").request_hash
    );
  }

  #[test]
  fn test_hex_request_hash_passes_through() {
    let hex = RequestMetadata::hash_of(&["GET", "/users/1"]);
    assert_eq!(RequestMetadata::new(hex.clone(), "app.User").request_hash, hex);
  }

  #[test]
  fn test_stale_finality_depends_on_refresh() {
    assert!(!CacheStatus::Stale.is_final(true));
    assert!(CacheStatus::Stale.is_final(false));
    assert!(CacheStatus::Fresh.is_final(true));
    assert!(CacheStatus::Empty.is_final(true));
  }
}
