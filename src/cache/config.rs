//! Cache configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VloopError};

/// Bounds applied to a `ValidationCache`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Maximum total estimated size of all entries, in bytes
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: usize,

    /// Entry lifetime in seconds (fractions allowed); 0 disables expiry
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: f64,
}

fn default_max_entries() -> usize {
    1000
}

fn default_max_memory_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_ttl_seconds() -> f64 {
    3600.0
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_memory_bytes: default_max_memory_bytes(),
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

impl CacheConfig {
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_memory_bytes(mut self, max_memory_bytes: usize) -> Self {
        self.max_memory_bytes = max_memory_bytes;
        self
    }

    /// Set the entry lifetime; `None` disables expiry
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl_seconds = ttl.map(|d| d.as_secs_f64()).unwrap_or(0.0);
        self
    }

    /// Entry lifetime, if entries expire at all.
    ///
    /// A lifetime too large to represent means no expiry.
    pub fn ttl(&self) -> Option<Duration> {
        if self.ttl_seconds > 0.0 {
            Duration::try_from_secs_f64(self.ttl_seconds).ok()
        } else {
            None
        }
    }

    /// Reject bounds that would make the cache unusable
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(VloopError::InvalidConfig("cache max_entries must be >= 1".to_string()));
        }
        if self.max_memory_bytes == 0 {
            return Err(VloopError::InvalidConfig("cache max_memory_bytes must be >= 1".to_string()));
        }
        if self.ttl_seconds.is_nan() || self.ttl_seconds < 0.0 {
            return Err(VloopError::InvalidConfig("cache ttl_seconds must be >= 0".to_string()));
        }
        if let Err(e) = Duration::try_from_secs_f64(self.ttl_seconds) {
            return Err(VloopError::InvalidConfig(format!(
                "cache ttl_seconds {} is out of range: {}",
                self.ttl_seconds, e
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.max_memory_bytes, 64 * 1024 * 1024);
        assert_eq!(config.ttl(), Some(Duration::from_secs(3600)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_ttl_disables_expiry() {
        let config = CacheConfig::default().with_ttl(None);
        assert_eq!(config.ttl_seconds, 0.0);
        assert_eq!(config.ttl(), None);
    }

    #[test]
    fn test_sub_second_ttl() {
        let config = CacheConfig::default().with_ttl(Some(Duration::from_millis(250)));
        assert_eq!(config.ttl(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_validate_rejects_zero_bounds() {
        assert!(CacheConfig::default().with_max_entries(0).validate().is_err());
        assert!(CacheConfig::default().with_max_memory_bytes(0).validate().is_err());
        let negative = CacheConfig {
            ttl_seconds: -1.0,
            ..Default::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unrepresentable_ttl() {
        for ttl_seconds in [1e20, f64::INFINITY] {
            let config = CacheConfig {
                ttl_seconds,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(VloopError::InvalidConfig(_))));
            assert_eq!(config.ttl(), None);
        }
    }

    #[test]
    fn test_deserialize_partial_yaml() {
        let config: CacheConfig = serde_yaml::from_str("max_entries: 10").unwrap();
        assert_eq!(config.max_entries, 10);
        assert_eq!(config.ttl_seconds, 3600.0);
    }
}
