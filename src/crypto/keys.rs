//! Key Manager Module
//!
//! Owns the symmetric encryption key, its generation counter and rotation.

use std::fmt;

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use tracing::{info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::config::KeySource;
use crate::error::{CacheError, Result};

/// AES-256 key length in bytes.
pub const KEY_LENGTH: usize = 32;

/// PBKDF2 rounds used when deriving the key from a seed and salt.
pub const KEY_DERIVATION_ITERATIONS: u32 = 100_000;

// == Encryption Key ==
/// Secret key bytes tagged with the generation that produced them.
///
/// Bytes are wiped when the key is dropped.
pub struct EncryptionKey {
    bytes: Zeroizing<[u8; KEY_LENGTH]>,
    version: u64,
}

impl EncryptionKey {
    fn from_bytes(bytes: Zeroizing<[u8; KEY_LENGTH]>, version: u64) -> Self {
        Self { bytes, version }
    }

    fn random(version: u64) -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_LENGTH]);
        rand::rng().fill_bytes(&mut bytes[..]);
        Self::from_bytes(bytes, version)
    }

    /// Generation counter, starting at 1.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.bytes
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("version", &self.version)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

// == Rotation Result ==
/// Outcome of swapping in a new key generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationResult {
    /// Generation that entries must be migrated away from
    pub previous_version: u64,
    /// Generation now used for all new envelopes
    pub current_version: u64,
}

// == Key Manager ==
/// Holds the live key and, during a rotation window, the previous one.
#[derive(Debug)]
pub struct KeyManager {
    current: EncryptionKey,
    previous: Option<EncryptionKey>,
}

impl KeyManager {
    // == Constructor ==
    /// Builds the initial key from the configured source.
    ///
    /// A secret is used verbatim, a seed and salt go through PBKDF2-HMAC-SHA256,
    /// and with neither a random key is generated.
    pub fn from_source(source: &KeySource) -> Result<Self> {
        let mut bytes = Zeroizing::new([0u8; KEY_LENGTH]);

        match source {
            KeySource::Secret(secret) => {
                if secret.len() != KEY_LENGTH {
                    return Err(CacheError::InvalidConfig(format!(
                        "secret key must be {} bytes, got {}",
                        KEY_LENGTH,
                        secret.len()
                    )));
                }
                bytes.copy_from_slice(secret);
                info!("Encryption key loaded from supplied secret");
            }
            KeySource::Derived { seed, salt } => {
                if seed.is_empty() || salt.is_empty() {
                    return Err(CacheError::InvalidConfig(
                        "key derivation needs a non-empty seed and salt".to_string(),
                    ));
                }
                pbkdf2_hmac::<Sha256>(seed, salt, KEY_DERIVATION_ITERATIONS, &mut bytes[..]);
                info!("Encryption key derived from seed");
            }
            KeySource::Random => {
                rand::rng().fill_bytes(&mut bytes[..]);
                warn!("No key material configured; using a random key that will not survive a restart");
            }
        }

        Ok(Self {
            current: EncryptionKey::from_bytes(bytes, 1),
            previous: None,
        })
    }

    /// Key used for every new envelope.
    pub fn current_key(&self) -> &EncryptionKey {
        &self.current
    }

    /// Looks up the key for an envelope's generation.
    ///
    /// Only the current and (mid-rotation) previous generations are available.
    pub fn key_for(&self, version: u64) -> Option<&EncryptionKey> {
        if self.current.version == version {
            return Some(&self.current);
        }
        self.previous.as_ref().filter(|key| key.version == version)
    }

    // == Rotate ==
    /// Replaces the current key with a fresh random one.
    ///
    /// The old key stays available through `key_for` until `retire_previous`.
    /// A key still held from an unfinished earlier rotation is dropped.
    pub fn rotate(&mut self) -> RotationResult {
        let next = EncryptionKey::random(self.current.version + 1);
        let old = std::mem::replace(&mut self.current, next);
        let result = RotationResult {
            previous_version: old.version,
            current_version: self.current.version,
        };
        self.previous = Some(old);
        result
    }

    /// Drops the previous generation once no entry refers to it.
    pub fn retire_previous(&mut self) -> Option<u64> {
        self.previous.take().map(|key| key.version)
    }

    /// True while a previous generation is still held.
    pub fn in_transition(&self) -> bool {
        self.previous.is_some()
    }

    /// Zeroes all key material in place.
    pub fn wipe(&mut self) {
        self.current.bytes.zeroize();
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derived(seed: &str, salt: &str) -> KeySource {
        KeySource::Derived {
            seed: Zeroizing::new(seed.as_bytes().to_vec()),
            salt: salt.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_secret_used_verbatim() {
        let secret = [7u8; KEY_LENGTH];
        let manager =
            KeyManager::from_source(&KeySource::Secret(Zeroizing::new(secret.to_vec()))).unwrap();

        assert_eq!(manager.current_key().as_bytes(), &secret);
        assert_eq!(manager.current_key().version(), 1);
    }

    #[test]
    fn test_secret_wrong_length_rejected() {
        let result = KeyManager::from_source(&KeySource::Secret(Zeroizing::new(vec![1u8; 16])));
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = KeyManager::from_source(&derived("seed", "salt-one")).unwrap();
        let b = KeyManager::from_source(&derived("seed", "salt-one")).unwrap();
        let c = KeyManager::from_source(&derived("seed", "salt-two")).unwrap();

        assert_eq!(a.current_key().as_bytes(), b.current_key().as_bytes());
        assert_ne!(a.current_key().as_bytes(), c.current_key().as_bytes());
    }

    #[test]
    fn test_derivation_requires_salt() {
        let result = KeyManager::from_source(&derived("seed", ""));
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_random_keys_differ() {
        let a = KeyManager::from_source(&KeySource::Random).unwrap();
        let b = KeyManager::from_source(&KeySource::Random).unwrap();
        assert_ne!(a.current_key().as_bytes(), b.current_key().as_bytes());
    }

    #[test]
    fn test_rotate_keeps_previous_until_retired() {
        let mut manager = KeyManager::from_source(&KeySource::Random).unwrap();
        let original = *manager.current_key().as_bytes();

        let result = manager.rotate();
        assert_eq!(result.previous_version, 1);
        assert_eq!(result.current_version, 2);
        assert_ne!(manager.current_key().as_bytes(), &original);
        assert!(manager.in_transition());

        let old = manager.key_for(1).unwrap();
        assert_eq!(old.as_bytes(), &original);
        assert!(manager.key_for(2).is_some());

        assert_eq!(manager.retire_previous(), Some(1));
        assert!(manager.key_for(1).is_none());
        assert!(!manager.in_transition());
    }

    #[test]
    fn test_back_to_back_rotation_drops_oldest() {
        let mut manager = KeyManager::from_source(&KeySource::Random).unwrap();
        manager.rotate();
        manager.rotate();

        assert!(manager.key_for(1).is_none());
        assert!(manager.key_for(2).is_some());
        assert_eq!(manager.current_key().version(), 3);
    }

    #[test]
    fn test_wipe_zeroes_key() {
        let mut manager = KeyManager::from_source(&KeySource::Random).unwrap();
        manager.rotate();
        manager.wipe();

        assert_eq!(manager.current_key().as_bytes(), &[0u8; KEY_LENGTH]);
        assert!(!manager.in_transition());
    }

    #[test]
    fn test_debug_hides_key_bytes() {
        let manager =
            KeyManager::from_source(&KeySource::Secret(Zeroizing::new(vec![0x42; KEY_LENGTH])))
                .unwrap();
        let printed = format!("{:?}", manager.current_key());
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("66"));
    }
}
