//! In-process cache engine.
//!
//! - [`CacheEngine`]: namespaced key/value store with per-entry TTL and LRU eviction under an
//!   entry cap. Values go through `serde_json`, so every write and read is a deep copy.
//! - [`SweeperHandle`]: the periodic background sweep that physically removes expired entries.
//!
//! The cache is local to the process. State that must agree across instances lives in the rate
//! limiter's shared counter store instead.

mod engine;
mod entry;
mod lru;
mod stats;
mod sweeper;

pub use engine::{CacheEngine, MAX_KEY_LENGTH};
pub use entry::EntryInfo;
pub use stats::CacheStats;
pub use sweeper::SweeperHandle;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry cap; inserting a new key at the cap evicts the least recently used entry.
    pub max_entries: usize,
    /// TTL applied when `set` is called without one.
    pub default_ttl_secs: u64,
    /// Period of the background sweep.
    pub cleanup_interval_ms: u64,
    /// Prefix joined to every key as `"{namespace}:{key}"`.
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            default_ttl_secs: 300,
            cleanup_interval_ms: 60_000,
            namespace: "bulwark".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::positive("cache.max_entries"));
        }
        if self.default_ttl_secs == 0 {
            return Err(ConfigError::positive("cache.default_ttl_secs"));
        }
        if self.cleanup_interval_ms == 0 {
            return Err(ConfigError::positive("cache.cleanup_interval_ms"));
        }
        if self.namespace.is_empty() || self.namespace.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                field: "cache.namespace".into(),
                reason: "must be non-empty and contain no whitespace".into(),
            });
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}
