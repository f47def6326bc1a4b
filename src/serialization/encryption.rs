//! AES-256-GCM payload encryption.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};

use super::decorator::{DecoratorContext, DecoratorKind, SerializationDecorator};
use crate::error::CacheError;

const NONCE_LEN: usize = 12;

/// Encrypts payloads with AES-256-GCM. A random nonce is prepended to each
/// ciphertext so decryption needs no external state.
pub struct EncryptionDecorator {
  cipher: Aes256Gcm,
}

impl EncryptionDecorator {
  /// Create a decorator from a raw 32-byte key.
  pub fn new(key: &[u8; 32]) -> Self {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    Self { cipher }
  }

  /// Derive the key from a master passphrase via SHA-256.
  pub fn from_master_key(master_key: &str) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(master_key.as_bytes());
    let key: [u8; 32] = hasher.finalize().into();
    Self::new(&key)
  }
}

impl SerializationDecorator for EncryptionDecorator {
  fn kind(&self) -> DecoratorKind {
    DecoratorKind::Encryption
  }

  fn encode(&self, ctx: &DecoratorContext<'_>, bytes: Vec<u8>) -> Result<Vec<u8>, CacheError> {
    let nonce_bytes: [u8; NONCE_LEN] = rand::random();
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = self
      .cipher
      .encrypt(nonce, bytes.as_ref())
      .map_err(|e| CacheError::serialization("encrypt", ctx.type_id, e))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
  }

  fn decode(&self, ctx: &DecoratorContext<'_>, bytes: Vec<u8>) -> Result<Vec<u8>, CacheError> {
    if bytes.len() < NONCE_LEN {
      return Err(CacheError::serialization(
        "decrypt",
        ctx.type_id,
        "payload shorter than nonce",
      ));
    }
    let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    self
      .cipher
      .decrypt(nonce, ciphertext)
      .map_err(|e| CacheError::serialization("decrypt", ctx.type_id, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::priority::{CacheMode, CachePreference, CachePriority};
  use crate::token::Operation;

  fn cache_operation() -> Operation {
    Operation::Cache {
      priority: CachePriority::new(CacheMode::Cache, CachePreference::Default),
      ttl: chrono::Duration::minutes(5),
    }
  }

  #[test]
  fn test_round_trip() {
    let operation = cache_operation();
    let ctx = DecoratorContext {
      type_id: "user",
      operation: &operation,
    };
    let decorator = EncryptionDecorator::from_master_key("secret");
    let payload = b"confidential response".to_vec();
    let encoded = decorator.encode(&ctx, payload.clone()).unwrap();
    assert_ne!(encoded, payload);
    let decoded = decorator.decode(&ctx, encoded).unwrap();
    assert_eq!(decoded, payload);
  }

  #[test]
  fn test_wrong_key_fails() {
    let operation = cache_operation();
    let ctx = DecoratorContext {
      type_id: "user",
      operation: &operation,
    };
    let encoded = EncryptionDecorator::from_master_key("secret")
      .encode(&ctx, b"confidential".to_vec())
      .unwrap();
    let result = EncryptionDecorator::from_master_key("other").decode(&ctx, encoded);
    assert!(matches!(result, Err(CacheError::Serialization { .. })));
  }

  #[test]
  fn test_truncated_payload_fails() {
    let operation = cache_operation();
    let ctx = DecoratorContext {
      type_id: "user",
      operation: &operation,
    };
    let decorator = EncryptionDecorator::from_master_key("secret");
    let result = decorator.decode(&ctx, vec![1, 2, 3]);
    assert!(matches!(result, Err(CacheError::Serialization { .. })));
  }
}
