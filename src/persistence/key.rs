//! Textual encoding of entry metadata into storage keys.
//!
//! Key grammar: `c1_{request_hash}_{response_type_hash}_{cached_ms}_{expiry_ms}`.
//! The leading marker lets scans reject foreign keys cheaply before a full
//! parse. Request metadata re-hashes anything that is not plain
//! alphanumeric, so hashes never contain the separator.

use thiserror::Error;

const KEY_MARKER: &str = "c1";
const SEPARATOR: char = '_';
const FIELD_COUNT: usize = 5;

/// Metadata carried by a storage key, epoch milliseconds at this boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMeta {
  pub request_hash: String,
  pub response_type_hash: String,
  pub cached_at_ms: i64,
  pub expires_at_ms: i64,
}

/// A key that failed to parse. Local to scanning operations, which skip the
/// offending key; never surfaced to callers.
#[derive(Debug, Error)]
#[error("malformed cache key '{key}'")]
pub struct MalformedKey {
  pub key: String,
}

/// Encode entry metadata into a storage key.
pub fn encode(meta: &KeyMeta) -> String {
  format!(
    "{}_{}_{}_{}_{}",
    KEY_MARKER, meta.request_hash, meta.response_type_hash, meta.cached_at_ms, meta.expires_at_ms
  )
}

/// Cheap structural pre-check: marker plus field count, no full parse.
pub fn is_valid_format(key: &str) -> bool {
  let mut parts = key.split(SEPARATOR);
  parts.next() == Some(KEY_MARKER) && key.split(SEPARATOR).count() == FIELD_COUNT
}

/// Decode a storage key; exact inverse of [`encode`] for any key it
/// produced.
pub fn decode(key: &str) -> Result<KeyMeta, MalformedKey> {
  let malformed = || MalformedKey {
    key: key.to_string(),
  };

  let parts: Vec<&str> = key.split(SEPARATOR).collect();
  if parts.len() != FIELD_COUNT || parts[0] != KEY_MARKER {
    return Err(malformed());
  }

  let cached_at_ms: i64 = parts[3].parse().map_err(|_| malformed())?;
  let expires_at_ms: i64 = parts[4].parse().map_err(|_| malformed())?;

  Ok(KeyMeta {
    request_hash: parts[1].to_string(),
    response_type_hash: parts[2].to_string(),
    cached_at_ms,
    expires_at_ms,
  })
}
