//! Request-level admission: who is calling, which limit applies, and what to answer.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::rate_limit::limiter::SlidingWindowLimiter;
use crate::rate_limit::store::WindowStore;
use crate::rate_limit::{RateLimitHeaders, RateLimitOutcome};
use crate::telemetry::{NullSink, TelemetrySink};

/// Which caller attribute names the counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierSource {
    /// API key, else authenticated user, else client IP.
    #[default]
    Auto,
    ApiKey,
    User,
    Ip,
}

/// What the transport knows about the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub api_key: Option<String>,
    pub user_id: Option<String>,
    /// Peer address of the connection.
    pub remote_addr: Option<IpAddr>,
    /// Raw `X-Forwarded-For` value.
    pub forwarded_for: Option<String>,
    /// Raw `X-Real-IP` value.
    pub real_ip: Option<String>,
}

impl CallerIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_forwarded_for(mut self, value: impl Into<String>) -> Self {
        self.forwarded_for = Some(value.into());
        self
    }

    pub fn with_real_ip(mut self, value: impl Into<String>) -> Self {
        self.real_ip = Some(value.into());
        self
    }

    /// Client IP: peer address, else the first `X-Forwarded-For` hop, else `X-Real-IP`.
    pub fn client_ip(&self) -> Option<String> {
        if let Some(addr) = self.remote_addr {
            return Some(addr.to_string());
        }
        let forwarded = self
            .forwarded_for
            .as_deref()
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        forwarded
            .or_else(|| self.real_ip.as_deref().map(str::trim).filter(|v| !v.is_empty()))
            .map(str::to_string)
    }

    /// Counter identifier, e.g. `api_key:abc`, `user:42`, `ip:10.0.0.1`.
    ///
    /// A named source that is absent falls back to the client IP; `ip:unknown` when even
    /// that is missing.
    pub fn resolve(&self, source: IdentifierSource) -> String {
        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);
        let api_key = || non_empty(&self.api_key).map(|k| format!("api_key:{k}"));
        let user = || non_empty(&self.user_id).map(|u| format!("user:{u}"));

        let preferred = match source {
            IdentifierSource::Auto => api_key().or_else(user),
            IdentifierSource::ApiKey => api_key(),
            IdentifierSource::User => user(),
            IdentifierSource::Ip => None,
        };
        preferred.unwrap_or_else(|| {
            format!("ip:{}", self.client_ip().unwrap_or_else(|| "unknown".to_string()))
        })
    }
}

/// Limit descriptor attached to a route, at class (controller) or method (handler) level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteRateLimit {
    pub endpoint: Option<String>,
    pub strategy: Option<String>,
    pub identifier: Option<IdentifierSource>,
    pub skip: Option<bool>,
}

impl RouteRateLimit {
    pub fn endpoint(name: impl Into<String>) -> Self {
        Self { endpoint: Some(name.into()), ..Self::default() }
    }

    pub fn strategy(name: impl Into<String>) -> Self {
        Self { strategy: Some(name.into()), ..Self::default() }
    }

    pub fn skipped() -> Self {
        Self { skip: Some(true), ..Self::default() }
    }

    pub fn with_identifier(mut self, source: IdentifierSource) -> Self {
        self.identifier = Some(source);
        self
    }

    pub fn is_skipped(&self) -> bool {
        self.skip.unwrap_or(false)
    }

    /// Combine class- and method-level descriptors; method fields win where set.
    pub fn merge(class: Option<&Self>, method: Option<&Self>) -> Option<Self> {
        match (class, method) {
            (None, None) => None,
            (Some(only), None) | (None, Some(only)) => Some(only.clone()),
            (Some(class), Some(method)) => Some(Self {
                endpoint: method.endpoint.clone().or_else(|| class.endpoint.clone()),
                strategy: method.strategy.clone().or_else(|| class.strategy.clone()),
                identifier: method.identifier.or(class.identifier),
                skip: method.skip.or(class.skip),
            }),
        }
    }
}

/// Decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The route opted out; no headers.
    Unlimited,
    Allowed { outcome: RateLimitOutcome, headers: RateLimitHeaders },
    /// Answer `429 Too Many Requests` with these headers.
    Rejected { retry_after: Duration, headers: RateLimitHeaders },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Admission::Rejected { .. })
    }

    /// `Some(429)` for rejections.
    pub fn status(&self) -> Option<u16> {
        match self {
            Admission::Rejected { .. } => Some(429),
            _ => None,
        }
    }

    pub fn headers(&self) -> Option<&RateLimitHeaders> {
        match self {
            Admission::Unlimited => None,
            Admission::Allowed { headers, .. } | Admission::Rejected { headers, .. } => Some(headers),
        }
    }
}

/// Front door for request handling: caller identity + route descriptor → [`Admission`].
#[derive(Debug)]
pub struct AdmissionGuard<S, T = NullSink> {
    limiter: Arc<SlidingWindowLimiter<S, T>>,
}

impl<S, T> Clone for AdmissionGuard<S, T> {
    fn clone(&self) -> Self {
        Self { limiter: self.limiter.clone() }
    }
}

impl<S, T> AdmissionGuard<S, T> {
    pub fn new(limiter: SlidingWindowLimiter<S, T>) -> Self {
        Self { limiter: Arc::new(limiter) }
    }

    pub fn from_shared(limiter: Arc<SlidingWindowLimiter<S, T>>) -> Self {
        Self { limiter }
    }

    pub fn limiter(&self) -> &SlidingWindowLimiter<S, T> {
        &self.limiter
    }
}

impl<S, T> AdmissionGuard<S, T>
where
    S: WindowStore,
    T: TelemetrySink,
{
    /// Decide whether a request may proceed.
    ///
    /// Routes without a descriptor, or with `skip` set, are not limited. An empty descriptor
    /// applies the default limit.
    pub async fn admit(&self, route: Option<&RouteRateLimit>, caller: &CallerIdentity) -> Admission {
        let Some(route) = route.filter(|r| !r.is_skipped()) else {
            return Admission::Unlimited;
        };

        let identifier = caller.resolve(route.identifier.unwrap_or_default());
        let endpoint = route.endpoint.as_deref();
        let strategy = route.strategy.as_deref();

        let outcome = self.limiter.check(&identifier, endpoint, strategy).await;
        let headers = outcome.headers();
        if outcome.allowed {
            Admission::Allowed { outcome, headers }
        } else {
            tracing::warn!(
                identifier = %identifier,
                endpoint = endpoint.unwrap_or("-"),
                strategy = strategy.unwrap_or("-"),
                retry_after_secs = outcome.retry_after_secs,
                "rate limit exceeded"
            );
            Admission::Rejected { retry_after: outcome.retry_after(), headers }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate_limit::config::{RateLimitConfig, WindowLimit};
    use crate::rate_limit::store::InMemoryWindowStore;
    use std::net::Ipv4Addr;

    #[test]
    fn api_key_beats_user_beats_ip() {
        let caller = CallerIdentity::new()
            .with_api_key("k1")
            .with_user("42")
            .with_remote_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(caller.resolve(IdentifierSource::Auto), "api_key:k1");
        assert_eq!(caller.resolve(IdentifierSource::User), "user:42");
        assert_eq!(caller.resolve(IdentifierSource::Ip), "ip:10.0.0.1");

        let anonymous = CallerIdentity::new().with_user("42");
        assert_eq!(anonymous.resolve(IdentifierSource::ApiKey), "ip:unknown");
    }

    #[test]
    fn forwarded_headers_supply_the_ip() {
        let caller = CallerIdentity::new().with_forwarded_for(" 203.0.113.7 , 10.0.0.2");
        assert_eq!(caller.resolve(IdentifierSource::Auto), "ip:203.0.113.7");

        let caller = CallerIdentity::new().with_forwarded_for("").with_real_ip("198.51.100.3");
        assert_eq!(caller.resolve(IdentifierSource::Auto), "ip:198.51.100.3");

        assert_eq!(CallerIdentity::new().resolve(IdentifierSource::Auto), "ip:unknown");
    }

    #[test]
    fn method_descriptor_overrides_class_descriptor() {
        let class = RouteRateLimit::strategy("moderate").with_identifier(IdentifierSource::User);
        let method = RouteRateLimit::endpoint("auth.login");

        let merged = RouteRateLimit::merge(Some(&class), Some(&method)).unwrap();
        assert_eq!(merged.endpoint.as_deref(), Some("auth.login"));
        assert_eq!(merged.strategy.as_deref(), Some("moderate"));
        assert_eq!(merged.identifier, Some(IdentifierSource::User));
        assert!(!merged.is_skipped());

        let skip_all = RouteRateLimit::skipped();
        let opt_back_in = RouteRateLimit { skip: Some(false), ..RouteRateLimit::default() };
        assert!(RouteRateLimit::merge(Some(&skip_all), None).unwrap().is_skipped());
        assert!(!RouteRateLimit::merge(Some(&skip_all), Some(&opt_back_in)).unwrap().is_skipped());
        assert_eq!(RouteRateLimit::merge(None, None), None);
    }

    fn guard(max: u32) -> AdmissionGuard<InMemoryWindowStore> {
        let config = RateLimitConfig::with_default(WindowLimit::new(60_000, max))
            .endpoint("auth.login", WindowLimit::new(900_000, 1));
        let limiter = SlidingWindowLimiter::new(InMemoryWindowStore::new(), config)
            .unwrap()
            .with_clock(ManualClock::new(0));
        AdmissionGuard::new(limiter)
    }

    #[tokio::test]
    async fn skipped_or_undescribed_routes_are_unlimited() {
        let guard = guard(1);
        let caller = CallerIdentity::new().with_user("1");
        let route = RouteRateLimit::skipped();
        for _ in 0..5 {
            assert_eq!(guard.admit(Some(&route), &caller).await, Admission::Unlimited);
            assert_eq!(guard.admit(None, &caller).await, Admission::Unlimited);
        }
    }

    #[tokio::test]
    async fn rejection_carries_429_and_headers() {
        let guard = guard(10);
        let caller = CallerIdentity::new().with_user("1");
        let route = RouteRateLimit::endpoint("auth.login");

        let first = guard.admit(Some(&route), &caller).await;
        assert!(first.is_allowed());
        assert_eq!(first.headers().map(|h| h.limit), Some(1));

        let second = guard.admit(Some(&route), &caller).await;
        assert_eq!(second.status(), Some(429));
        match second {
            Admission::Rejected { retry_after, headers } => {
                assert_eq!(retry_after, Duration::from_secs(900));
                assert_eq!(headers.remaining, 0);
                assert_eq!(headers.retry_after, Some(900));
                assert_eq!(headers.reset, "1970-01-01T00:15:00.000Z");
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        // The global scope counts separately.
        let default_route = RouteRateLimit::default();
        assert!(guard.admit(Some(&default_route), &caller).await.is_allowed());
    }
}
