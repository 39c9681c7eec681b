//! Crypto Module
//!
//! Key management, key normalization and the per-entry codec.

mod codec;
mod keys;
mod normalize;

pub use codec::{Codec, Envelope, IV_LENGTH, TAG_LENGTH};
pub use keys::{EncryptionKey, KeyManager, RotationResult, KEY_DERIVATION_ITERATIONS, KEY_LENGTH};
pub use normalize::{KeyNormalizer, NormalizedKey, NORMALIZED_KEY_LENGTH, NORMALIZE_ITERATIONS};
