//! Error types for the secure cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the secure cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// External key is empty or longer than the configured maximum
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Serialized value exceeds the configured maximum size
    #[error("Value too large: {size} bytes exceeds limit of {limit} bytes")]
    ValueTooLarge { size: usize, limit: usize },

    /// AEAD encryption failed
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Authentication tag mismatch or malformed envelope
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Deflate stream could not be produced or read back
    #[error("Compression failed: {0}")]
    Compression(String),

    /// Stored bytes could not be mapped to the requested type
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration rejected at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation attempted after shutdown
    #[error("Cache has been shut down")]
    Closed,
}

// == Result Type Alias ==
/// Convenience Result type for the secure cache.
pub type Result<T> = std::result::Result<T, CacheError>;
