//! Convenient re-exports for wiring the layer into a service.
pub use crate::{
    cache::{CacheConfig, CacheEngine},
    error::{CacheError, ResilienceError, TransactionError},
    rate_limit::{
        Admission, AdmissionGuard, AdmissionLayer, CallerIdentity, IdentifyCaller,
        RateLimitConfig, RateLimitHeaderSink, RouteRateLimit, SlidingWindowLimiter,
    },
    transaction::{SagaStep, TransactionManager, TransactionOptions, TransactionRetryExecutor},
    ResilienceConfig,
};
