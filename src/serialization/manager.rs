//! Object ↔ string ↔ bytes conversion plus the decorator chain.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::decorator::{DecoratorContext, DecoratorKind, SerializationDecorator, TransformFlags};
use crate::error::CacheError;
use crate::token::Operation;

/// Type id for responses whose wire representation is already a plain
/// string; these bypass the codec registry entirely.
pub const PLAIN_STRING_TYPE_ID: &str = "string";

type ErasedValue = Box<dyn Any + Send + Sync>;
type EncodeFn = Box<dyn Fn(&(dyn Any + Send + Sync)) -> Result<String, CacheError> + Send + Sync>;
type DecodeFn = Box<dyn Fn(&str) -> Result<ErasedValue, CacheError> + Send + Sync>;

struct CodecEntry {
  encode: EncodeFn,
  decode: DecodeFn,
}

/// Maps stable type identifiers to encode/decode functions, resolved at
/// configuration time rather than by runtime type lookup.
#[derive(Default)]
pub struct CodecRegistry {
  codecs: HashMap<String, CodecEntry>,
}

impl CodecRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a serde-backed codec for `T` under a stable type id.
  pub fn register<T>(&mut self, type_id: &str)
  where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
  {
    let id = type_id.to_string();
    let encode_id = id.clone();
    let decode_id = id.clone();
    self.codecs.insert(
      id,
      CodecEntry {
        encode: Box::new(move |value| {
          let typed = value.downcast_ref::<T>().ok_or_else(|| {
            CacheError::serialization(
              "encode",
              &encode_id,
              "value does not match the registered codec type",
            )
          })?;
          serde_json::to_string(typed)
            .map_err(|e| CacheError::serialization("encode", &encode_id, e))
        }),
        decode: Box::new(move |text| {
          let typed: T = serde_json::from_str(text)
            .map_err(|e| CacheError::serialization("decode", &decode_id, e))?;
          Ok(Box::new(typed) as ErasedValue)
        }),
      },
    );
  }

  pub fn can_handle(&self, type_id: &str) -> bool {
    self.codecs.contains_key(type_id)
  }

  fn encode(&self, type_id: &str, value: &(dyn Any + Send + Sync)) -> Result<String, CacheError> {
    let entry = self
      .codecs
      .get(type_id)
      .ok_or_else(|| CacheError::UnsupportedType(type_id.to_string()))?;
    (entry.encode)(value)
  }

  fn decode(&self, type_id: &str, text: &str) -> Result<ErasedValue, CacheError> {
    let entry = self
      .codecs
      .get(type_id)
      .ok_or_else(|| CacheError::UnsupportedType(type_id.to_string()))?;
    (entry.decode)(text)
  }
}

/// Orchestrates object ↔ string ↔ bytes conversion and the decorator chain.
///
/// The configured chain applies in order on the way in and in mirror order
/// on the way out, so `deserialize(serialize(x)) == x` for any registered
/// type and any enabled decorator subset.
pub struct SerializationManager {
  registry: CodecRegistry,
  decorators: Vec<Arc<dyn SerializationDecorator>>,
}

impl SerializationManager {
  pub fn new(registry: CodecRegistry, decorators: Vec<Arc<dyn SerializationDecorator>>) -> Self {
    Self {
      registry,
      decorators,
    }
  }

  /// Flags describing the configured chain, recorded on stored entries.
  pub fn transform_flags(&self) -> TransformFlags {
    TransformFlags {
      compressed: self.has_kind(DecoratorKind::Compression),
      encrypted: self.has_kind(DecoratorKind::Encryption),
    }
  }

  fn has_kind(&self, kind: DecoratorKind) -> bool {
    self.decorators.iter().any(|d| d.kind() == kind)
  }

  /// Serialize a response to payload bytes.
  ///
  /// Plain strings are used as-is; any other type goes through its
  /// registered codec. The optional one-off decorator applies before the
  /// configured chain.
  pub fn serialize(
    &self,
    value: &(dyn Any + Send + Sync),
    type_id: &str,
    operation: &Operation,
    extra: Option<&dyn SerializationDecorator>,
  ) -> Result<Vec<u8>, CacheError> {
    let text = match value.downcast_ref::<String>() {
      Some(s) => s.clone(),
      None => self.registry.encode(type_id, value)?,
    };

    let ctx = DecoratorContext { type_id, operation };
    let mut bytes = text.into_bytes();
    if let Some(decorator) = extra {
      bytes = decorator.encode(&ctx, bytes)?;
    }
    for decorator in &self.decorators {
      bytes = decorator.encode(&ctx, bytes)?;
    }
    Ok(bytes)
  }

  /// Deserialize payload bytes back into a typed response.
  ///
  /// The configured chain applies in reverse, then the optional one-off
  /// decorator, mirroring [`Self::serialize`].
  pub fn deserialize(
    &self,
    type_id: &str,
    operation: &Operation,
    mut bytes: Vec<u8>,
    extra: Option<&dyn SerializationDecorator>,
  ) -> Result<ErasedValue, CacheError> {
    let ctx = DecoratorContext { type_id, operation };
    for decorator in self.decorators.iter().rev() {
      bytes = decorator.decode(&ctx, bytes)?;
    }
    if let Some(decorator) = extra {
      bytes = decorator.decode(&ctx, bytes)?;
    }

    let text = String::from_utf8(bytes)
      .map_err(|e| CacheError::serialization("decode", type_id, e))?;

    if self.registry.can_handle(type_id) {
      self.registry.decode(type_id, &text)
    } else if type_id == PLAIN_STRING_TYPE_ID {
      Ok(Box::new(text))
    } else {
      Err(CacheError::UnsupportedType(type_id.to_string()))
    }
  }
}
