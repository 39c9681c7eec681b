//! Configuration Module
//!
//! Handles loading and validating cache configuration from environment variables.

use std::env;
use std::fmt;

use zeroize::Zeroizing;

use crate::error::{CacheError, Result};

/// Bytes per megabyte used for the size budgets.
const BYTES_PER_MB: usize = 1024 * 1024;

// == Key Source ==
/// Where the initial encryption key comes from.
#[derive(Clone, Default)]
pub enum KeySource {
    /// Raw 32-byte key supplied by the application, used verbatim
    Secret(Zeroizing<Vec<u8>>),
    /// Key derived from a seed and salt with PBKDF2
    Derived {
        seed: Zeroizing<Vec<u8>>,
        salt: Vec<u8>,
    },
    /// Fresh random key; entries will not survive a process restart
    #[default]
    Random,
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Secret(_) => f.write_str("Secret(<redacted>)"),
            KeySource::Derived { .. } => f.write_str("Derived(<redacted>)"),
            KeySource::Random => f.write_str("Random"),
        }
    }
}

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Memory budget for stored envelopes, in megabytes
    pub max_size_mb: usize,
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    /// Default TTL in milliseconds for entries without explicit TTL
    pub default_ttl_ms: u64,
    /// Expired-entry sweep interval in milliseconds
    pub cleanup_interval_ms: u64,
    /// Key rotation interval in milliseconds
    pub key_rotation_interval_ms: u64,
    /// Security check interval in milliseconds
    pub security_check_interval_ms: u64,
    /// Payloads at least this large are candidates for compression
    pub compression_threshold_bytes: usize,
    /// Maximum external key length in bytes
    pub max_key_length: usize,
    /// Maximum serialized value size, in megabytes
    pub max_value_size_mb: usize,
    /// Accesses per key within an hour before raising `suspicious_access`
    pub suspicious_access_threshold: usize,
    /// Initial key material
    pub key_source: KeySource,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SECURE_CACHE_MAX_SIZE_MB` - Memory budget in MB (default: 100)
    /// - `SECURE_CACHE_MAX_ENTRIES` - Maximum cache entries (default: 10000)
    /// - `SECURE_CACHE_DEFAULT_TTL_MS` - Default TTL (default: 600000)
    /// - `SECURE_CACHE_CLEANUP_INTERVAL_MS` - Sweep frequency (default: 60000)
    /// - `SECURE_CACHE_KEY_ROTATION_INTERVAL_MS` - Rotation frequency (default: 86400000)
    /// - `SECURE_CACHE_SECURITY_CHECK_INTERVAL_MS` - Check frequency (default: 60000)
    /// - `SECURE_CACHE_COMPRESSION_THRESHOLD` - Bytes (default: 1024)
    /// - `SECURE_CACHE_MAX_KEY_LENGTH` - Bytes (default: 512)
    /// - `SECURE_CACHE_MAX_VALUE_SIZE_MB` - MB (default: 10)
    /// - `SECURE_CACHE_SUSPICIOUS_ACCESS_THRESHOLD` - Accesses/hour (default: 1000)
    /// - `SECURE_CACHE_SECRET` - 64 hex characters, used verbatim as the key
    /// - `SECURE_CACHE_SEED` / `SECURE_CACHE_SALT` - Key derivation inputs
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_size_mb: env_or("SECURE_CACHE_MAX_SIZE_MB", defaults.max_size_mb),
            max_entries: env_or("SECURE_CACHE_MAX_ENTRIES", defaults.max_entries),
            default_ttl_ms: env_or("SECURE_CACHE_DEFAULT_TTL_MS", defaults.default_ttl_ms),
            cleanup_interval_ms: env_or(
                "SECURE_CACHE_CLEANUP_INTERVAL_MS",
                defaults.cleanup_interval_ms,
            ),
            key_rotation_interval_ms: env_or(
                "SECURE_CACHE_KEY_ROTATION_INTERVAL_MS",
                defaults.key_rotation_interval_ms,
            ),
            security_check_interval_ms: env_or(
                "SECURE_CACHE_SECURITY_CHECK_INTERVAL_MS",
                defaults.security_check_interval_ms,
            ),
            compression_threshold_bytes: env_or(
                "SECURE_CACHE_COMPRESSION_THRESHOLD",
                defaults.compression_threshold_bytes,
            ),
            max_key_length: env_or("SECURE_CACHE_MAX_KEY_LENGTH", defaults.max_key_length),
            max_value_size_mb: env_or(
                "SECURE_CACHE_MAX_VALUE_SIZE_MB",
                defaults.max_value_size_mb,
            ),
            suspicious_access_threshold: env_or(
                "SECURE_CACHE_SUSPICIOUS_ACCESS_THRESHOLD",
                defaults.suspicious_access_threshold,
            ),
            key_source: key_source_from_env(),
        }
    }

    // == Validate ==
    /// Rejects configurations the cache cannot operate under.
    pub fn validate(&self) -> Result<()> {
        if self.max_size_mb == 0 {
            return Err(CacheError::InvalidConfig(
                "max_size_mb must be greater than 0".to_string(),
            ));
        }
        if self.max_entries == 0 {
            return Err(CacheError::InvalidConfig(
                "max_entries must be greater than 0".to_string(),
            ));
        }
        if self.max_key_length == 0 {
            return Err(CacheError::InvalidConfig(
                "max_key_length must be greater than 0".to_string(),
            ));
        }
        if self.max_value_size_mb == 0 {
            return Err(CacheError::InvalidConfig(
                "max_value_size_mb must be greater than 0".to_string(),
            ));
        }
        if self.max_value_size_mb > self.max_size_mb {
            return Err(CacheError::InvalidConfig(format!(
                "max_value_size_mb ({}) must not exceed max_size_mb ({})",
                self.max_value_size_mb, self.max_size_mb
            )));
        }
        if self.cleanup_interval_ms == 0
            || self.key_rotation_interval_ms == 0
            || self.security_check_interval_ms == 0
        {
            return Err(CacheError::InvalidConfig(
                "maintenance intervals must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Memory budget in bytes.
    pub fn max_size_bytes(&self) -> usize {
        self.max_size_mb.saturating_mul(BYTES_PER_MB)
    }

    /// Maximum serialized value size in bytes.
    pub fn max_value_size_bytes(&self) -> usize {
        self.max_value_size_mb.saturating_mul(BYTES_PER_MB)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_size_mb: 100,
            max_entries: 10_000,
            default_ttl_ms: 10 * 60 * 1000,
            cleanup_interval_ms: 60 * 1000,
            key_rotation_interval_ms: 24 * 60 * 60 * 1000,
            security_check_interval_ms: 60 * 1000,
            compression_threshold_bytes: 1024,
            max_key_length: 512,
            max_value_size_mb: 10,
            suspicious_access_threshold: 1000,
            key_source: KeySource::Random,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn key_source_from_env() -> KeySource {
    if let Some(secret) = env::var("SECURE_CACHE_SECRET")
        .ok()
        .and_then(|v| hex::decode(v.trim()).ok())
    {
        return KeySource::Secret(Zeroizing::new(secret));
    }

    match (env::var("SECURE_CACHE_SEED"), env::var("SECURE_CACHE_SALT")) {
        (Ok(seed), Ok(salt)) if !seed.is_empty() && !salt.is_empty() => KeySource::Derived {
            seed: Zeroizing::new(seed.into_bytes()),
            salt: salt.into_bytes(),
        },
        _ => KeySource::Random,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_size_mb, 100);
        assert_eq!(config.max_entries, 10_000);
        assert_eq!(config.default_ttl_ms, 600_000);
        assert_eq!(config.compression_threshold_bytes, 1024);
        assert_eq!(config.suspicious_access_threshold, 1000);
        assert!(matches!(config.key_source, KeySource::Random));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("SECURE_CACHE_MAX_ENTRIES");
        env::remove_var("SECURE_CACHE_DEFAULT_TTL_MS");
        env::remove_var("SECURE_CACHE_SECRET");
        env::remove_var("SECURE_CACHE_SEED");

        let config = Config::from_env();
        assert_eq!(config.max_entries, 10_000);
        assert_eq!(config.default_ttl_ms, 600_000);
        assert!(matches!(config.key_source, KeySource::Random));
    }

    #[test]
    fn test_byte_budgets() {
        let config = Config {
            max_size_mb: 2,
            max_value_size_mb: 1,
            ..Config::default()
        };
        assert_eq!(config.max_size_bytes(), 2 * 1024 * 1024);
        assert_eq!(config.max_value_size_bytes(), 1024 * 1024);
    }

    #[test]
    fn test_validate_rejects_zero_budgets() {
        let config = Config {
            max_entries: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidConfig(_))
        ));

        let config = Config {
            cleanup_interval_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_value_limit_above_budget() {
        let config = Config {
            max_size_mb: 1,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidConfig(_))
        ));

        let config = Config {
            max_size_mb: 1,
            max_value_size_mb: 1,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_key_source_debug_is_redacted() {
        let source = KeySource::Secret(Zeroizing::new(vec![0xAB; 32]));
        let printed = format!("{:?}", source);
        assert_eq!(printed, "Secret(<redacted>)");
        assert!(!printed.contains("171"));
    }
}
