//! Cache layer that orchestrates freshness decisions, persistence and
//! network fetching.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, NetworkError};
use crate::persistence::{
  CacheRecord, KeyValueStore, PersistenceManager, StatisticsCompiler,
};
use crate::resolver::{offline_fallback_status, resolve, status_after_fetch};
use crate::serialization::{
  CodecRegistry, CompressionDecorator, EncryptionDecorator, SerializationDecorator,
  SerializationManager,
};
use crate::token::{CacheEvent, CacheStatus, CacheToken, Operation, Outcome, RequestMetadata};

/// Cooperative cancellation signal, checked before any mutating step.
///
/// Cancelling after a fetch succeeds suppresses both the persistence write
/// and the terminal success emission.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
  cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::Release);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::Acquire)
  }
}

/// The cache orchestrator.
///
/// Sits between the application and its network client: for each operation
/// it consults the priority matrix, reads through the persistence manager,
/// optionally invokes the caller-supplied fetch, and emits an ordered
/// sequence of at most two results (a stale-first emission followed by the
/// final one).
pub struct CacheLayer {
  persistence: Arc<PersistenceManager>,
  clock: Arc<dyn Clock>,
}

impl CacheLayer {
  pub fn builder() -> CacheLayerBuilder {
    CacheLayerBuilder::new()
  }

  /// Execute one operation.
  ///
  /// `fetch` is invoked at most once, and only for cacheable operations
  /// whose priority requires a refresh. A successful fetch is persisted
  /// before its result is emitted; a failed fetch never mutates storage.
  pub async fn handle<R, F, Fut>(
    &self,
    operation: Operation,
    metadata: RequestMetadata,
    fetch: F,
    cancel: &CancellationToken,
  ) -> Result<Vec<CacheEvent<R>>, CacheError>
  where
    R: Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<R, NetworkError>>,
  {
    match &operation {
      Operation::Clear {
        type_filter,
        stale_only,
      } => {
        let removed = self
          .persistence
          .clear_cache(type_filter.as_deref(), *stale_only)?;
        Ok(vec![acknowledged(operation.clone(), metadata, removed > 0)])
      }
      Operation::Invalidate => {
        let affected = self.persistence.force_invalidation(&metadata)?;
        Ok(vec![acknowledged(operation.clone(), metadata, affected)])
      }
      Operation::Cache { priority, .. } => {
        let behaviour = priority.behaviour();
        let now = self.clock.now();
        let stored = self.persistence.get_record(&metadata, true)?;
        let resolution = resolve(now, stored.as_ref().map(|r| r.expires_at), behaviour);

        debug!(
          request_hash = %metadata.request_hash,
          has_stored = resolution.has_stored,
          is_stale = resolution.is_stale,
          attempt_fetch = resolution.attempt_fetch,
          "resolved cache request"
        );

        let mut events: Vec<CacheEvent<R>> = Vec::with_capacity(2);

        if let Some(record) = &stored {
          if resolution.emit_fresh {
            let response = self.decode_response::<R>(record, &operation)?;
            events.push(record_event(&operation, &metadata, CacheStatus::Fresh, record, response));
            debug_assert!(events.iter().all(|e| behaviour.allows(e.token.status)));
            return Ok(events);
          }
          if resolution.emit_stale_first {
            let response = self.decode_response::<R>(record, &operation)?;
            events.push(record_event(&operation, &metadata, CacheStatus::Stale, record, response));
          }
        }

        if resolution.attempt_fetch {
          match fetch().await {
            Ok(response) => {
              if cancel.is_cancelled() {
                debug!(request_hash = %metadata.request_hash, "cancelled, write suppressed");
                return Ok(events);
              }
              // Persist before emitting, so a read issued after observing
              // this result sees the new data. The token reports the dates
              // actually written into the key.
              let dates = self.persistence.cache(&response, &operation, &metadata)?;
              let status = status_after_fetch(true, &resolution, behaviour);
              events.push(CacheEvent {
                token: CacheToken {
                  operation: operation.clone(),
                  metadata: metadata.clone(),
                  status,
                  cached_at: Some(dates.cached_at),
                  expires_at: Some(dates.expires_at),
                },
                outcome: Outcome::Data(response),
              });
            }
            Err(cause) => {
              let status = status_after_fetch(false, &resolution, behaviour);
              match (&stored, status) {
                (Some(record), CacheStatus::CouldNotRefresh) => {
                  let response = self.decode_response::<R>(record, &operation)?;
                  events.push(record_event(&operation, &metadata, status, record, response));
                }
                _ => {
                  events.push(empty_event(&operation, &metadata, Some(cause)));
                }
              }
            }
          }
        } else if !behaviour.uses_network {
          // Offline: nothing fresh to serve and no refresh allowed.
          let status = offline_fallback_status(&resolution, behaviour);
          match (&stored, status) {
            (Some(record), CacheStatus::Stale) => {
              let response = self.decode_response::<R>(record, &operation)?;
              events.push(record_event(&operation, &metadata, status, record, response));
            }
            _ => {
              events.push(empty_event(&operation, &metadata, None));
            }
          }
        }

        debug_assert!(events.iter().all(|e| behaviour.allows(e.token.status)));
        Ok(events)
      }
    }
  }

  /// The stored entry for a request, if any. Read-only.
  pub fn get_record(
    &self,
    metadata: &RequestMetadata,
    with_payload: bool,
  ) -> Result<Option<CacheRecord>, CacheError> {
    self.persistence.get_record(metadata, with_payload)
  }

  /// Read-only statistics view over the store.
  pub fn statistics(&self) -> StatisticsCompiler {
    StatisticsCompiler::new(Arc::clone(&self.persistence), Arc::clone(&self.clock))
  }

  fn decode_response<R>(
    &self,
    record: &CacheRecord,
    operation: &Operation,
  ) -> Result<R, CacheError>
  where
    R: Send + Sync + 'static,
  {
    let value = self.persistence.decode_record(record, operation)?;
    value.downcast::<R>().map(|boxed| *boxed).map_err(|_| {
      CacheError::serialization(
        "decode",
        &record.response_type_name,
        "stored payload does not match the requested response type",
      )
    })
  }
}

fn acknowledged<R>(
  operation: Operation,
  metadata: RequestMetadata,
  affected: bool,
) -> CacheEvent<R> {
  CacheEvent {
    token: CacheToken {
      operation,
      metadata,
      status: CacheStatus::Empty,
      cached_at: None,
      expires_at: None,
    },
    outcome: Outcome::Acknowledged { affected },
  }
}

fn record_event<R>(
  operation: &Operation,
  metadata: &RequestMetadata,
  status: CacheStatus,
  record: &CacheRecord,
  response: R,
) -> CacheEvent<R> {
  CacheEvent {
    token: CacheToken {
      operation: operation.clone(),
      metadata: metadata.clone(),
      status,
      cached_at: Some(record.cached_at),
      expires_at: Some(record.expires_at),
    },
    outcome: Outcome::Data(response),
  }
}

fn empty_event<R>(
  operation: &Operation,
  metadata: &RequestMetadata,
  cause: Option<NetworkError>,
) -> CacheEvent<R> {
  CacheEvent {
    token: CacheToken {
      operation: operation.clone(),
      metadata: metadata.clone(),
      status: CacheStatus::Empty,
      cached_at: None,
      expires_at: None,
    },
    outcome: Outcome::Empty(cause),
  }
}

/// Builder wiring the codec registry, payload transforms, clock and storage
/// backend into a [`CacheLayer`].
pub struct CacheLayerBuilder {
  registry: CodecRegistry,
  compress: bool,
  encryption_key: Option<String>,
  clock: Arc<dyn Clock>,
}

impl CacheLayerBuilder {
  fn new() -> Self {
    Self {
      registry: CodecRegistry::new(),
      compress: false,
      encryption_key: None,
      clock: Arc::new(SystemClock),
    }
  }

  /// Register a serde-backed codec for `T` under a stable type id.
  pub fn register_codec<T>(mut self, type_id: &str) -> Self
  where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
  {
    self.registry.register::<T>(type_id);
    self
  }

  /// Compress stored payloads.
  pub fn compress_payloads(mut self) -> Self {
    self.compress = true;
    self
  }

  /// Encrypt stored payloads with a key derived from the given passphrase.
  pub fn encrypt_payloads(mut self, master_key: impl Into<String>) -> Self {
    self.encryption_key = Some(master_key.into());
    self
  }

  /// Override the date source (tests inject a fixed clock).
  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn build(self, store: impl KeyValueStore + 'static) -> CacheLayer {
    let mut decorators: Vec<Arc<dyn SerializationDecorator>> = Vec::new();
    // Compression must precede encryption: encrypted bytes don't compress.
    if self.compress {
      decorators.push(Arc::new(CompressionDecorator));
    }
    if let Some(master_key) = &self.encryption_key {
      decorators.push(Arc::new(EncryptionDecorator::from_master_key(master_key)));
    }

    let serializer = Arc::new(SerializationManager::new(self.registry, decorators));
    let persistence = Arc::new(PersistenceManager::new(
      Arc::new(store),
      serializer,
      Arc::clone(&self.clock),
    ));

    CacheLayer {
      persistence,
      clock: self.clock,
    }
  }
}
