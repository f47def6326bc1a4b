//! Serialization pipeline: content codecs plus a chain of reversible byte
//! transforms (compression, encryption) applied to stored payloads.

pub mod compression;
pub mod decorator;
pub mod encryption;
pub mod manager;

pub use compression::CompressionDecorator;
pub use decorator::{DecoratorContext, DecoratorKind, SerializationDecorator, TransformFlags};
pub use encryption::EncryptionDecorator;
pub use manager::{CodecRegistry, SerializationManager, PLAIN_STRING_TYPE_ID};
