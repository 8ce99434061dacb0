//! Deployment configuration for the whole layer.
//!
//! ```json
//! {
//!   "rate_limit": {
//!     "default": { "window_ms": 60000, "max": 100 },
//!     "endpoints": { "auth.login": { "window_ms": 900000, "max": 5 } },
//!     "failure_policy": "open"
//!   },
//!   "cache": { "max_entries": 5000, "namespace": "tasks" },
//!   "transaction": { "isolation_level": "read-committed", "max_retries": 3 }
//! }
//! ```
//!
//! Every section and field is optional; missing ones take their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cache::CacheConfig;
use crate::error::ConfigError;
use crate::rate_limit::RateLimitConfig;
use crate::transaction::TransactionOptions;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    /// Options used by call sites that do not pass their own.
    pub transaction: TransactionOptions,
}

impl ResilienceConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "loading resilience configuration");
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rate_limit.validate()?;
        self.cache.validate()?;
        self.transaction.validate()
    }
}
