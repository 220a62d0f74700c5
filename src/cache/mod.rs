//! Validation result cache
//!
//! This module provides:
//! - CacheKey derived from validator fingerprint, version, content and context
//! - ValidationCache with LRU, memory and TTL bounds plus single-flight
//! - CachedValidator, a Validator wrapper routing calls through the cache

pub mod cached;
pub mod config;
pub mod key;
pub mod store;

pub use cached::CachedValidator;
pub use config::CacheConfig;
pub use key::CacheKey;
pub use store::{CacheStats, ValidationCache};
