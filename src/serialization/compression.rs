//! LZ4 payload compression.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use tracing::debug;

use super::decorator::{DecoratorContext, DecoratorKind, SerializationDecorator};
use crate::error::CacheError;

/// Compresses payloads with LZ4, prepending the original length so the
/// transform inverts without external state.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressionDecorator;

impl SerializationDecorator for CompressionDecorator {
  fn kind(&self) -> DecoratorKind {
    DecoratorKind::Compression
  }

  fn encode(&self, ctx: &DecoratorContext<'_>, bytes: Vec<u8>) -> Result<Vec<u8>, CacheError> {
    let original = bytes.len();
    let compressed = compress_prepend_size(&bytes);
    debug!(
      type_id = ctx.type_id,
      original,
      compressed = compressed.len(),
      "compressed payload"
    );
    Ok(compressed)
  }

  fn decode(&self, ctx: &DecoratorContext<'_>, bytes: Vec<u8>) -> Result<Vec<u8>, CacheError> {
    decompress_size_prepended(&bytes)
      .map_err(|e| CacheError::serialization("decompress", ctx.type_id, e))
  }
}
