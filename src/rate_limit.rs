//! Sliding-window rate limiting.
//!
//! The pieces:
//! - [`WindowStore`]: the shared counter store. One atomic batch per check trims the window,
//!   counts what is left, records the current request and refreshes the key's expiry.
//!   [`InMemoryWindowStore`] serves single-instance deployments and tests; the distributed
//!   store lives in `bulwark-redis`.
//! - [`SlidingWindowLimiter`]: resolves the applicable limit and turns the store's answer into
//!   a [`RateLimitOutcome`], applying an explicit [`FailurePolicy`] when the store is down.
//! - [`AdmissionGuard`]: request-level facade. Resolves the caller's identity and the route's
//!   limit descriptor, and returns an [`Admission`] carrying the `X-RateLimit-*` headers.
//! - [`AdmissionLayer`]: tower middleware that applies the guard at the outermost boundary.

use chrono::{SecondsFormat, TimeZone, Utc};
use std::time::Duration;

pub mod config;
pub mod guard;
pub mod limiter;
pub mod middleware;
pub mod store;

pub use config::{FailurePolicy, RateLimitConfig, ResolvedLimit, WindowLimit};
pub use guard::{Admission, AdmissionGuard, CallerIdentity, IdentifierSource, RouteRateLimit};
pub use limiter::SlidingWindowLimiter;
pub use middleware::{AdmissionLayer, AdmissionService, IdentifyCaller, RateLimitHeaderSink};
pub use store::{InMemoryWindowStore, WindowRequest, WindowSnapshot, WindowStore};

pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Result of one limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    /// The `max` of the limit that applied.
    pub limit: u32,
    /// `max - count`, where `count` excludes the request being checked.
    pub remaining: u32,
    /// When the oldest request in the window leaves it (epoch millis).
    pub reset_at_ms: u64,
    /// Whole seconds until a retry can succeed; `0` when allowed.
    pub retry_after_secs: u64,
}

impl RateLimitOutcome {
    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after_secs)
    }

    /// Response headers describing this outcome.
    pub fn headers(&self) -> RateLimitHeaders {
        RateLimitHeaders {
            limit: self.limit,
            remaining: self.remaining,
            reset: format_reset(self.reset_at_ms),
            retry_after: (!self.allowed).then_some(self.retry_after_secs),
        }
    }
}

/// `X-RateLimit-*` / `Retry-After` values for one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub remaining: u32,
    /// ISO-8601 timestamp.
    pub reset: String,
    /// Present only on rejections.
    pub retry_after: Option<u64>,
}

impl RateLimitHeaders {
    /// Header name/value pairs in a stable order.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (HEADER_LIMIT, self.limit.to_string()),
            (HEADER_REMAINING, self.remaining.to_string()),
            (HEADER_RESET, self.reset.clone()),
        ];
        if let Some(secs) = self.retry_after {
            pairs.push((HEADER_RETRY_AFTER, secs.to_string()));
        }
        pairs
    }
}

fn format_reset(epoch_ms: u64) -> String {
    let millis = i64::try_from(epoch_ms).unwrap_or(i64::MAX);
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}
