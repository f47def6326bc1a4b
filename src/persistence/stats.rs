//! Read-only statistics over stored entries.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::PersistenceManager;
use crate::clock::Clock;
use crate::error::CacheError;
use crate::token::CacheStatus;

/// One row of the statistics view. Ephemeral and derived; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub response_type: String,
  pub status: CacheStatus,
  pub cached_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

/// Derives per-entry statistics from the persistence manager's key
/// enumeration without decoding payloads. Never mutates the store; safe to
/// run concurrently with reads.
pub struct StatisticsCompiler {
  persistence: Arc<PersistenceManager>,
  clock: Arc<dyn Clock>,
}

impl StatisticsCompiler {
  pub fn new(persistence: Arc<PersistenceManager>, clock: Arc<dyn Clock>) -> Self {
    Self { persistence, clock }
  }

  pub fn list(&self) -> Result<Vec<CacheEntry>, CacheError> {
    let now = self.clock.now();
    let entries = self
      .persistence
      .records()?
      .into_iter()
      .map(|record| CacheEntry {
        response_type: record.response_type_name.clone(),
        status: if record.is_stale(now) {
          CacheStatus::Stale
        } else {
          CacheStatus::Fresh
        },
        cached_at: record.cached_at,
        expires_at: record.expires_at,
      })
      .collect();
    Ok(entries)
  }
}
