//! Limit table and failure policy for the sliding-window limiter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::ConfigError;

/// A maximum number of requests per sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    pub window_ms: u64,
    pub max: u32,
}

impl WindowLimit {
    pub const fn new(window_ms: u64, max: u32) -> Self {
        Self { window_ms, max }
    }

    pub fn per(window: Duration, max: u32) -> Self {
        Self { window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX), max }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.window_ms == 0 {
            return Err(ConfigError::positive(format!("{field}.window_ms")));
        }
        if self.max == 0 {
            return Err(ConfigError::positive(format!("{field}.max")));
        }
        Ok(())
    }
}

/// What the limiter answers when the counter store cannot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Admit the request. Availability over strictness.
    #[default]
    Open,
    /// Reject the request as if the limit were exhausted.
    Closed,
}

/// The limit chosen for one check, plus the counter scope it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLimit {
    pub limit: WindowLimit,
    /// Second half of the counter key: the endpoint tag, else the strategy tag, else `global`.
    pub scope: String,
}

/// Limit table: a default, named endpoints, and named strategies.
///
/// Endpoint entries win over strategy entries, which win over the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub default: WindowLimit,
    pub endpoints: HashMap<String, WindowLimit>,
    pub strategies: HashMap<String, WindowLimit>,
    pub failure_policy: FailurePolicy,
    /// Client-side bound on one store round trip.
    pub store_timeout_ms: u64,
    /// Prefix of every counter key.
    pub key_prefix: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let minute = 60_000;
        Self {
            default: WindowLimit::new(minute, 100),
            endpoints: HashMap::from([
                ("auth.login".to_string(), WindowLimit::new(15 * minute, 5)),
                ("auth.register".to_string(), WindowLimit::new(60 * minute, 3)),
                ("auth.refresh".to_string(), WindowLimit::new(minute, 10)),
            ]),
            strategies: HashMap::from([
                ("strict".to_string(), WindowLimit::new(minute, 10)),
                ("moderate".to_string(), WindowLimit::new(minute, 50)),
                ("relaxed".to_string(), WindowLimit::new(minute, 300)),
            ]),
            failure_policy: FailurePolicy::Open,
            store_timeout_ms: 500,
            key_prefix: "rate_limit".to_string(),
        }
    }
}

impl RateLimitConfig {
    /// A table holding only a default limit.
    pub fn with_default(limit: WindowLimit) -> Self {
        Self {
            default: limit,
            endpoints: HashMap::new(),
            strategies: HashMap::new(),
            ..Self::default()
        }
    }

    pub fn endpoint(mut self, name: impl Into<String>, limit: WindowLimit) -> Self {
        self.endpoints.insert(name.into(), limit);
        self
    }

    pub fn strategy(mut self, name: impl Into<String>, limit: WindowLimit) -> Self {
        self.strategies.insert(name.into(), limit);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Pick the limit for an endpoint/strategy pair.
    ///
    /// The counter scope follows the tags the caller supplied even when they have no entry of
    /// their own, so unconfigured endpoints still count separately under the default limit.
    pub fn resolve(&self, endpoint: Option<&str>, strategy: Option<&str>) -> ResolvedLimit {
        let limit = endpoint
            .and_then(|e| self.endpoints.get(e))
            .or_else(|| strategy.and_then(|s| self.strategies.get(s)))
            .copied()
            .unwrap_or(self.default);
        let scope = endpoint.or(strategy).unwrap_or("global").to_string();
        ResolvedLimit { limit, scope }
    }

    /// Counter key for an identifier under a resolved scope.
    pub fn key_for(&self, identifier: &str, scope: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, identifier, scope)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default.validate("rate_limit.default")?;
        for (name, limit) in &self.endpoints {
            limit.validate(&format!("rate_limit.endpoints.{name}"))?;
        }
        for (name, limit) in &self.strategies {
            limit.validate(&format!("rate_limit.strategies.{name}"))?;
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::positive("rate_limit.store_timeout_ms"));
        }
        if self.key_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "rate_limit.key_prefix".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}
