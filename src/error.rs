//! Error taxonomy for the cache core.

use thiserror::Error;

/// Errors surfaced by cache operations.
///
/// Freshness outcomes (stale data, refresh failures, empty results) are never
/// errors; they are reported through [`crate::token::CacheStatus`]. Only
/// genuine faults reach this type.
#[derive(Debug, Error)]
pub enum CacheError {
  /// No content codec is registered for the given response type.
  #[error("no codec registered for response type '{0}'")]
  UnsupportedType(String),

  /// Encoding or decoding a payload failed (corrupt bytes, decorator
  /// mismatch, or a type that doesn't match its registered codec).
  #[error("failed to {action} response type '{type_id}': {detail}")]
  Serialization {
    action: &'static str,
    type_id: String,
    detail: String,
  },

  /// The key-value store failed. Not retried internally; propagates from the
  /// specific call that triggered it.
  #[error("store failure during {operation} for '{key}': {detail}")]
  Store {
    operation: &'static str,
    key: String,
    detail: String,
  },
}

impl CacheError {
  pub(crate) fn serialization(
    action: &'static str,
    type_id: &str,
    detail: impl ToString,
  ) -> Self {
    Self::Serialization {
      action,
      type_id: type_id.to_string(),
      detail: detail.to_string(),
    }
  }

  pub(crate) fn store(operation: &'static str, key: &str, detail: impl ToString) -> Self {
    Self::Store {
      operation,
      key: key.to_string(),
      detail: detail.to_string(),
    }
  }
}

/// Opaque network failure reported by the fetch collaborator.
///
/// The core only distinguishes success from failure; whether a failure is
/// retryable is the caller's policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("network fetch failed: {message}")]
pub struct NetworkError {
  pub message: String,
}

impl NetworkError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}
