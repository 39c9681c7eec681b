//! Option and report models for the cache API
//!
//! This module defines the plain data types passed into and returned from
//! `SecureCache` operations.

pub mod options;
pub mod reports;

// Re-export commonly used types
pub use options::SetOptions;
pub use reports::{CacheSize, RotationReport};
