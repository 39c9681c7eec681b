//! Codec Module
//!
//! Optional deflate compression plus AES-256-GCM sealing of a single entry payload.

use std::io::{Read, Write};

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::keys::EncryptionKey;
use crate::crypto::normalize::NormalizedKey;
use crate::error::{CacheError, Result};

/// AES-GCM nonce length in bytes.
pub const IV_LENGTH: usize = 12;

/// AES-GCM tag length in bytes.
pub const TAG_LENGTH: usize = 16;

// == Envelope ==
/// Encrypted payload and the parameters needed to open it.
#[derive(Clone)]
pub struct Envelope {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_LENGTH],
    pub auth_tag: [u8; TAG_LENGTH],
    /// Payload was deflated before sealing
    pub compressed: bool,
    /// Key generation that sealed this envelope
    pub key_version: u64,
}

impl Envelope {
    /// Bytes held by the envelope itself.
    pub fn len(&self) -> usize {
        self.ciphertext.len() + IV_LENGTH + TAG_LENGTH
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("compressed", &self.compressed)
            .field("key_version", &self.key_version)
            .finish()
    }
}

// == Codec ==
/// Compression policy and AEAD sealing for cache payloads.
#[derive(Debug, Clone)]
pub struct Codec {
    compression_threshold: usize,
    max_plaintext: usize,
}

impl Codec {
    // == Constructor ==
    /// # Arguments
    /// * `compression_threshold` - Smallest payload worth deflating
    /// * `max_plaintext` - Cap on decompressed output
    pub fn new(compression_threshold: usize, max_plaintext: usize) -> Self {
        Self {
            compression_threshold,
            max_plaintext,
        }
    }

    // == Encode ==
    /// Compresses (when worthwhile) and seals a plaintext for the given slot.
    pub fn encode(
        &self,
        slot: &NormalizedKey,
        plaintext: &[u8],
        compress_hint: bool,
        key: &EncryptionKey,
    ) -> Result<Envelope> {
        let (payload, compressed) = self.compress(plaintext, compress_hint)?;
        self.seal(slot, &payload, compressed, key)
    }

    // == Decode ==
    /// Opens an envelope and inflates it if needed.
    ///
    /// # Errors
    /// `Decryption` on any tag mismatch; `Compression` on a bad deflate stream.
    pub fn decode(
        &self,
        slot: &NormalizedKey,
        envelope: &Envelope,
        key: &EncryptionKey,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let payload = self.open(slot, envelope, key)?;
        if envelope.compressed {
            self.decompress(&payload)
        } else {
            Ok(payload)
        }
    }

    // == Reseal ==
    /// Moves an envelope to a new key without inflating the payload.
    pub fn reseal(
        &self,
        slot: &NormalizedKey,
        envelope: &Envelope,
        old_key: &EncryptionKey,
        new_key: &EncryptionKey,
    ) -> Result<Envelope> {
        let payload = self.open(slot, envelope, old_key)?;
        self.seal(slot, &payload, envelope.compressed, new_key)
    }

    // == Compress ==
    /// Deflates the payload when it is large enough and the result saves at least 10%.
    pub fn compress(
        &self,
        plaintext: &[u8],
        compress_hint: bool,
    ) -> Result<(Zeroizing<Vec<u8>>, bool)> {
        if !compress_hint || plaintext.len() < self.compression_threshold {
            return Ok((Zeroizing::new(plaintext.to_vec()), false));
        }

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(plaintext)
            .map_err(|e| CacheError::Compression(e.to_string()))?;
        let deflated = Zeroizing::new(
            encoder
                .finish()
                .map_err(|e| CacheError::Compression(e.to_string()))?,
        );

        if deflated.len() * 10 <= plaintext.len() * 9 {
            Ok((deflated, true))
        } else {
            Ok((Zeroizing::new(plaintext.to_vec()), false))
        }
    }

    fn decompress(&self, payload: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let mut out = Zeroizing::new(Vec::new());
        DeflateDecoder::new(payload)
            .take(self.max_plaintext as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| CacheError::Compression(e.to_string()))?;

        if out.len() > self.max_plaintext {
            return Err(CacheError::Compression(
                "inflated payload exceeds maximum value size".to_string(),
            ));
        }
        Ok(out)
    }

    fn seal(
        &self,
        slot: &NormalizedKey,
        payload: &[u8],
        compressed: bool,
        key: &EncryptionKey,
    ) -> Result<Envelope> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        let aad = associated_data(slot, key.version(), compressed);

        let mut iv = [0u8; IV_LENGTH];
        rand::rng().fill_bytes(&mut iv);

        let mut buffer = payload.to_vec();
        let tag = match cipher.encrypt_in_place_detached(Nonce::from_slice(&iv), &aad, &mut buffer)
        {
            Ok(tag) => tag,
            Err(_) => {
                buffer.zeroize();
                return Err(CacheError::Encryption("AEAD seal failed".to_string()));
            }
        };

        let mut auth_tag = [0u8; TAG_LENGTH];
        auth_tag.copy_from_slice(tag.as_slice());

        Ok(Envelope {
            ciphertext: buffer,
            iv,
            auth_tag,
            compressed,
            key_version: key.version(),
        })
    }

    fn open(
        &self,
        slot: &NormalizedKey,
        envelope: &Envelope,
        key: &EncryptionKey,
    ) -> Result<Zeroizing<Vec<u8>>> {
        if envelope.key_version != key.version() {
            return Err(CacheError::Decryption(format!(
                "envelope sealed with key v{}, given v{}",
                envelope.key_version,
                key.version()
            )));
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        let aad = associated_data(slot, envelope.key_version, envelope.compressed);

        let mut buffer = Zeroizing::new(envelope.ciphertext.clone());
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&envelope.iv),
                &aad,
                &mut buffer[..],
                Tag::from_slice(&envelope.auth_tag),
            )
            .map_err(|_| CacheError::Decryption("authentication tag mismatch".to_string()))?;
        Ok(buffer)
    }
}

/// Binds slot, key generation and compression flag to the ciphertext.
fn associated_data(slot: &NormalizedKey, key_version: u64, compressed: bool) -> Vec<u8> {
    let mut aad = Vec::with_capacity(slot.as_bytes().len() + 9);
    aad.extend_from_slice(slot.as_bytes());
    aad.extend_from_slice(&key_version.to_be_bytes());
    aad.push(u8::from(compressed));
    aad
}
