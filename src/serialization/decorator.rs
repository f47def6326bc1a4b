//! Reversible byte transforms applied to serialized payloads.

use crate::error::CacheError;
use crate::token::Operation;

/// Context handed to decorators; some transforms key their behaviour on the
/// response type or the operation being performed.
#[derive(Debug, Clone, Copy)]
pub struct DecoratorContext<'a> {
  pub type_id: &'a str,
  pub operation: &'a Operation,
}

/// What a decorator does to the payload; recorded as flags on stored
/// entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoratorKind {
  Compression,
  Encryption,
}

/// Which transforms a stored payload went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransformFlags {
  pub compressed: bool,
  pub encrypted: bool,
}

/// A reversible byte-level transform.
///
/// `decode` must invert `encode` for the same context without external
/// state; transforms that need extra information to invert (lengths,
/// nonces) embed it in their output. Decorators compose into an ordered
/// chain; decoding applies the chain in mirror order.
pub trait SerializationDecorator: Send + Sync {
  fn kind(&self) -> DecoratorKind;

  fn encode(&self, ctx: &DecoratorContext<'_>, bytes: Vec<u8>) -> Result<Vec<u8>, CacheError>;

  fn decode(&self, ctx: &DecoratorContext<'_>, bytes: Vec<u8>) -> Result<Vec<u8>, CacheError>;
}
