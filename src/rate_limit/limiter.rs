//! The sliding-window limiter.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::dynamic::DynamicConfig;
use crate::error::{ConfigError, StoreError};
use crate::rate_limit::config::{FailurePolicy, RateLimitConfig, ResolvedLimit};
use crate::rate_limit::store::{WindowRequest, WindowStore};
use crate::rate_limit::RateLimitOutcome;
use crate::telemetry::{emit_best_effort, NullSink, PolicyEvent, RateLimitEvent, TelemetrySink};

/// Counts requests per `(identifier, scope)` over a sliding window held in a [`WindowStore`].
///
/// Timestamps come from the wall clock so that every instance sharing the store agrees on
/// where a window starts. The limit table lives in a [`DynamicConfig`] and can be swapped at
/// runtime via [`update_config`](Self::update_config).
///
/// ```rust
/// use bulwark::rate_limit::{InMemoryWindowStore, RateLimitConfig, SlidingWindowLimiter, WindowLimit};
///
/// # tokio_test_block_on(async {
/// let config = RateLimitConfig::with_default(WindowLimit::new(60_000, 2));
/// let limiter = SlidingWindowLimiter::new(InMemoryWindowStore::new(), config).unwrap();
///
/// assert!(limiter.check("user:1", None, None).await.allowed);
/// assert!(limiter.check("user:1", None, None).await.allowed);
/// assert!(!limiter.check("user:1", None, None).await.allowed);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug)]
pub struct SlidingWindowLimiter<S, T = NullSink> {
    store: S,
    config: DynamicConfig<RateLimitConfig>,
    clock: Arc<dyn Clock>,
    sink: T,
}

impl<S: WindowStore> SlidingWindowLimiter<S, NullSink> {
    pub fn new(store: S, config: RateLimitConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            config: DynamicConfig::new(config),
            clock: Arc::new(SystemClock),
            sink: NullSink,
        })
    }
}

impl<S, T> SlidingWindowLimiter<S, T> {
    /// Replace the wall clock (tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_sink<T2: TelemetrySink>(self, sink: T2) -> SlidingWindowLimiter<S, T2> {
        SlidingWindowLimiter { store: self.store, config: self.config, clock: self.clock, sink }
    }

    pub fn config(&self) -> Arc<RateLimitConfig> {
        self.config.get()
    }

    /// Live handle; updates apply to the next check.
    pub fn config_handle(&self) -> DynamicConfig<RateLimitConfig> {
        self.config.clone()
    }

    /// Validate and install a new limit table.
    pub fn update_config(&self, config: RateLimitConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config.set(config);
        Ok(())
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, T> SlidingWindowLimiter<S, T>
where
    S: WindowStore,
    T: TelemetrySink,
{
    /// Check and record one request, surfacing store faults.
    pub async fn try_check(
        &self,
        identifier: &str,
        endpoint: Option<&str>,
        strategy: Option<&str>,
    ) -> Result<RateLimitOutcome, StoreError> {
        let config = self.config.get();
        let resolved = config.resolve(endpoint, strategy);
        let key = config.key_for(identifier, &resolved.scope);
        self.evaluate(&config, &key, &resolved).await
    }

    /// Check and record one request. Store faults are answered by the configured
    /// [`FailurePolicy`] and never reach the caller.
    pub async fn check(
        &self,
        identifier: &str,
        endpoint: Option<&str>,
        strategy: Option<&str>,
    ) -> RateLimitOutcome {
        let config = self.config.get();
        let resolved = config.resolve(endpoint, strategy);
        let key = config.key_for(identifier, &resolved.scope);

        match self.evaluate(&config, &key, &resolved).await {
            Ok(outcome) => outcome,
            Err(error) => self.degrade(config.failure_policy, key, &resolved, error).await,
        }
    }

    async fn evaluate(
        &self,
        config: &RateLimitConfig,
        key: &str,
        resolved: &ResolvedLimit,
    ) -> Result<RateLimitOutcome, StoreError> {
        let now = self.clock.now_millis();
        let limit = resolved.limit;
        let request = WindowRequest {
            key,
            now_ms: now,
            window_ms: limit.window_ms,
            member: format!("{now}-{}", uuid::Uuid::new_v4()),
        };

        let bound = config.store_timeout();
        let snapshot = tokio::time::timeout(bound, self.store.record(request))
            .await
            .map_err(|_| StoreError::Timeout(bound))??;

        let max = u64::from(limit.max);
        let allowed = snapshot.count < max;
        let remaining = u32::try_from(max.saturating_sub(snapshot.count)).unwrap_or(limit.max);
        let reset_at_ms = snapshot
            .oldest_ms
            .map(|oldest| oldest.saturating_add(limit.window_ms))
            .filter(|reset| *reset > now)
            .unwrap_or_else(|| now.saturating_add(limit.window_ms));
        let retry_after_secs = if allowed { 0 } else { (reset_at_ms - now).div_ceil(1_000) };

        let outcome = RateLimitOutcome {
            allowed,
            limit: limit.max,
            remaining,
            reset_at_ms,
            retry_after_secs,
        };

        if allowed {
            tracing::trace!(key, count = snapshot.count, max = limit.max, "rate limit check passed");
        } else {
            tracing::debug!(key, max = limit.max, retry_after_secs, "rate limit exceeded");
            let event = PolicyEvent::RateLimit(RateLimitEvent::Rejected {
                key: key.to_string(),
                limit: limit.max,
                retry_after: outcome.retry_after(),
            });
            emit_best_effort(self.sink.clone(), event).await;
        }
        Ok(outcome)
    }

    async fn degrade(
        &self,
        policy: FailurePolicy,
        key: String,
        resolved: &ResolvedLimit,
        error: StoreError,
    ) -> RateLimitOutcome {
        let now = self.clock.now_millis();
        let limit = resolved.limit;
        let reset_at_ms = now.saturating_add(limit.window_ms);
        let message = error.to_string();

        match policy {
            FailurePolicy::Open => {
                tracing::error!(key = %key, error = %message, "rate limit store failed; admitting request");
                emit_best_effort(
                    self.sink.clone(),
                    PolicyEvent::RateLimit(RateLimitEvent::FailedOpen { key, error: message }),
                )
                .await;
                RateLimitOutcome {
                    allowed: true,
                    limit: limit.max,
                    remaining: limit.max,
                    reset_at_ms,
                    retry_after_secs: 0,
                }
            }
            FailurePolicy::Closed => {
                tracing::error!(key = %key, error = %message, "rate limit store failed; rejecting request");
                emit_best_effort(
                    self.sink.clone(),
                    PolicyEvent::RateLimit(RateLimitEvent::FailedClosed { key, error: message }),
                )
                .await;
                RateLimitOutcome {
                    allowed: false,
                    limit: limit.max,
                    remaining: 0,
                    reset_at_ms,
                    retry_after_secs: Duration::from_millis(limit.window_ms).as_secs().max(1),
                }
            }
        }
    }
}
