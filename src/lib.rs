#![forbid(unsafe_code)]

//! # bulwark
//!
//! Resilience layer for a request-serving backend:
//!
//! - **Cache engine**: namespaced in-process cache with TTL, LRU eviction under an entry cap,
//!   hit/miss accounting and a background expiry sweep.
//! - **Sliding-window rate limiting** over a shared counter store, with an admission guard and
//!   a tower layer that attaches `X-RateLimit-*` headers and answers `429`.
//! - **Transaction retry executor** that re-runs units of work on deadlocks, serialization
//!   conflicts and transient connection faults with exponential backoff, plus sagas with
//!   reverse-order compensation.
//!
//! Distributed counters live in `bulwark-redis`; the PostgreSQL transaction manager in
//! `bulwark-postgres`.
//!
//! ## Quick Start
//!
//! ```rust
//! use bulwark::{CacheConfig, CacheEngine};
//! use std::time::Duration;
//!
//! let cache = CacheEngine::new(CacheConfig::default()).unwrap();
//! cache.set("task:1", &vec!["write docs", "ship"], Some(Duration::from_secs(30))).unwrap();
//!
//! let todo: Option<Vec<String>> = cache.get("task:1").unwrap();
//! assert_eq!(todo.unwrap().len(), 2);
//! assert_eq!(cache.stats().hit_count, 1);
//! ```

pub mod backoff;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dynamic;
pub mod error;
pub mod jitter;
pub mod prelude;
pub mod rate_limit;
pub mod sleeper;
pub mod telemetry;
pub mod transaction;

// Re-exports
pub use backoff::{Backoff, BackoffError, MAX_BACKOFF};
pub use cache::{CacheConfig, CacheEngine, CacheStats, EntryInfo, SweeperHandle};
pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use config::ResilienceConfig;
pub use dynamic::DynamicConfig;
pub use error::{CacheError, ConfigError, ResilienceError, StoreError, TransactionError};
pub use jitter::Jitter;
pub use rate_limit::{
    Admission, AdmissionGuard, AdmissionLayer, AdmissionService, CallerIdentity, FailurePolicy,
    IdentifierSource, IdentifyCaller, InMemoryWindowStore, RateLimitConfig, RateLimitHeaderSink,
    RateLimitHeaders, RateLimitOutcome, RouteRateLimit, SlidingWindowLimiter, WindowLimit,
    WindowStore,
};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use telemetry::{LogSink, MemorySink, NullSink, PolicyEvent, TelemetrySink};
pub use transaction::{
    IsolationLevel, SagaStep, TransactionManager, TransactionOptions, TransactionRetryExecutor,
};
