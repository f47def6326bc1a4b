//! A freshness-aware response cache that sits between an application and
//! its network client.
//!
//! For each request the cache decides, from a declarative priority, whether
//! to serve stored data, trigger a network refresh, or both, and in what
//! order. Successful responses are persisted through an
//! encode/compress/encrypt pipeline keyed by a hash of the request, and
//! every emitted result carries a token reporting which freshness status
//! applied.
//!
//! ```no_run
//! use recache::{
//!   CacheLayer, CacheMode, CachePreference, CachePriority, CancellationToken, FileStore,
//!   NetworkError, Operation, RequestMetadata,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct User {
//!   id: u64,
//! }
//!
//! # async fn demo() -> Result<(), recache::CacheError> {
//! let layer = CacheLayer::builder()
//!   .register_codec::<User>("app.User")
//!   .compress_payloads()
//!   .build(FileStore::open_default()?);
//!
//! let operation = Operation::Cache {
//!   priority: CachePriority::new(CacheMode::Cache, CachePreference::Default),
//!   ttl: chrono::Duration::minutes(5),
//! };
//! let metadata = RequestMetadata::new(
//!   RequestMetadata::hash_of(&["GET", "/users/1"]),
//!   "app.User",
//! );
//!
//! let events = layer
//!   .handle(
//!     operation,
//!     metadata,
//!     || async { Ok::<_, NetworkError>(User { id: 1 }) },
//!     &CancellationToken::new(),
//!   )
//!   .await?;
//! for event in events {
//!   println!("{:?}", event.token.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod error;
pub mod layer;
pub mod persistence;
pub mod priority;
pub mod resolver;
pub mod serialization;
pub mod token;

pub use clock::{Clock, SystemClock};
pub use error::{CacheError, NetworkError};
pub use layer::{CacheLayer, CacheLayerBuilder, CancellationToken};
pub use persistence::{
  CacheEntry, CacheRecord, FileStore, KeyValueStore, PersistenceManager, SqliteStore,
  StatisticsCompiler, StoredDates, StoredValue,
};
pub use priority::{CacheMode, CachePreference, CachePriority, PriorityBehaviour};
pub use serialization::{
  CodecRegistry, CompressionDecorator, EncryptionDecorator, SerializationDecorator,
  SerializationManager, TransformFlags,
};
pub use token::{CacheEvent, CacheStatus, CacheToken, Operation, Outcome, RequestMetadata};
