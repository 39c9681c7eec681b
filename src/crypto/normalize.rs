//! Key Normalizer Module
//!
//! Maps arbitrary external cache keys onto fixed-length internal identifiers.

use std::fmt;
use std::hash::{Hash, Hasher};

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{CacheError, Result};

/// Length of a normalized key in bytes.
pub const NORMALIZED_KEY_LENGTH: usize = 32;

/// PBKDF2 rounds per normalization. Kept small since it runs on every call.
pub const NORMALIZE_ITERATIONS: u32 = 1_000;

const SALT_LENGTH: usize = 16;

// == Normalized Key ==
/// Hashed internal identifier for an external key.
///
/// Equality is constant-time so map probes do not leak key content.
#[derive(Clone, Copy)]
pub struct NormalizedKey([u8; NORMALIZED_KEY_LENGTH]);

impl NormalizedKey {
    pub fn as_bytes(&self) -> &[u8; NORMALIZED_KEY_LENGTH] {
        &self.0
    }
}

impl PartialEq for NormalizedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0[..].ct_eq(&other.0[..]).into()
    }
}

impl Eq for NormalizedKey {}

impl Hash for NormalizedKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Short hex fingerprint, safe to put in logs and notifications.
impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NormalizedKey({})", self)
    }
}

// == Key Normalizer ==
/// Salted PBKDF2 hasher for external keys.
///
/// The salt is drawn once per cache instance.
pub struct KeyNormalizer {
    salt: [u8; SALT_LENGTH],
    max_key_length: usize,
}

impl KeyNormalizer {
    // == Constructor ==
    /// Creates a normalizer with a fresh random salt.
    pub fn new(max_key_length: usize) -> Self {
        let mut salt = [0u8; SALT_LENGTH];
        rand::rng().fill_bytes(&mut salt);
        Self {
            salt,
            max_key_length,
        }
    }

    // == Normalize ==
    /// Validates and hashes an external key.
    ///
    /// # Errors
    /// `InvalidKey` if the key is empty or longer than the configured maximum.
    pub fn normalize(&self, key: &str) -> Result<NormalizedKey> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey("key cannot be empty".to_string()));
        }
        if key.len() > self.max_key_length {
            return Err(CacheError::InvalidKey(format!(
                "key exceeds maximum length of {} bytes",
                self.max_key_length
            )));
        }

        let mut out = [0u8; NORMALIZED_KEY_LENGTH];
        pbkdf2_hmac::<Sha256>(key.as_bytes(), &self.salt, NORMALIZE_ITERATIONS, &mut out);
        Ok(NormalizedKey(out))
    }
}

impl fmt::Debug for KeyNormalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyNormalizer")
            .field("max_key_length", &self.max_key_length)
            .finish_non_exhaustive()
    }
}
