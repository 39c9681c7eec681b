//! Options for the set operation

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-call options for `SecureCache::set`.
///
/// # Fields
/// - `ttl_ms`: TTL in milliseconds (uses the configured default if not specified)
/// - `compress`: Allow compression of large payloads (default: true)
/// - `encrypt`: Accepted for compatibility; values are always encrypted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetOptions {
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    #[serde(default)]
    pub compress: Option<bool>,
    #[serde(default)]
    pub encrypt: Option<bool>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    pub fn ttl(self, ttl: Duration) -> Self {
        self.ttl_ms(ttl.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }

    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = Some(encrypt);
        self
    }

    /// Compression hint, defaulting to allowed.
    pub fn compress_hint(&self) -> bool {
        self.compress.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_options_deserialize_empty() {
        let opts: SetOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, SetOptions::default());
        assert!(opts.compress_hint());
    }

    #[test]
    fn test_set_options_deserialize_full() {
        let json = r#"{"ttl_ms": 50, "compress": false, "encrypt": true}"#;
        let opts: SetOptions = serde_json::from_str(json).unwrap();
        assert_eq!(opts.ttl_ms, Some(50));
        assert!(!opts.compress_hint());
        assert_eq!(opts.encrypt, Some(true));
    }

    #[test]
    fn test_builder_methods() {
        let opts = SetOptions::new()
            .ttl(Duration::from_secs(2))
            .compress(false)
            .encrypt(true);
        assert_eq!(opts.ttl_ms, Some(2_000));
        assert_eq!(opts.compress, Some(false));
        assert_eq!(opts.encrypt, Some(true));
    }
}
