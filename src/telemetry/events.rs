//! Event types emitted by the resilience layer.

use std::fmt;
use std::time::Duration;

/// Events emitted during limiter checks, transaction attempts and sagas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyEvent {
    RateLimit(RateLimitEvent),
    Retry(RetryEvent),
    Saga(SagaEvent),
}

/// Events emitted by the sliding-window limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitEvent {
    /// A caller exceeded its window.
    Rejected {
        /// Storage key (`rate_limit:{identifier}:{scope}`)
        key: String,
        limit: u32,
        retry_after: Duration,
    },
    /// The counter store failed and the request was admitted anyway.
    FailedOpen { key: String, error: String },
    /// The counter store failed and the request was refused.
    FailedClosed { key: String, error: String },
}

/// Events emitted by the transaction executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent {
    /// A retryable failure occurred; another attempt follows after `delay`.
    Attempt {
        /// Retry number (1 = first retry)
        attempt: u32,
        delay: Duration,
        /// SQLSTATE or error class of the failure that triggered the retry
        cause: String,
    },
    /// The retry budget ran out.
    Exhausted { total_attempts: u32, total_duration: Duration },
}

/// Events emitted by the saga runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaEvent {
    /// A step's execute transaction committed.
    StepCommitted { step: String, index: usize },
    /// A step's compensation committed during rollback.
    Compensated { step: String, index: usize },
    /// A compensation failed. The saga still reports the original error.
    CompensationFailed { step: String, index: usize, error: String },
}

impl fmt::Display for PolicyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyEvent::RateLimit(event) => write!(f, "RateLimit::{}", event),
            PolicyEvent::Retry(event) => write!(f, "Retry::{}", event),
            PolicyEvent::Saga(event) => write!(f, "Saga::{}", event),
        }
    }
}

impl fmt::Display for RateLimitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitEvent::Rejected { key, limit, retry_after } => {
                write!(f, "Rejected(key={}, limit={}, retry_after={:?})", key, limit, retry_after)
            }
            RateLimitEvent::FailedOpen { key, error } => {
                write!(f, "FailedOpen(key={}, error={})", key, error)
            }
            RateLimitEvent::FailedClosed { key, error } => {
                write!(f, "FailedClosed(key={}, error={})", key, error)
            }
        }
    }
}

impl fmt::Display for RetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryEvent::Attempt { attempt, delay, cause } => {
                write!(f, "Attempt(#{}, delay={:?}, cause={})", attempt, delay, cause)
            }
            RetryEvent::Exhausted { total_attempts, total_duration } => {
                write!(f, "Exhausted(attempts={}, duration={:?})", total_attempts, total_duration)
            }
        }
    }
}

impl fmt::Display for SagaEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SagaEvent::StepCommitted { step, index } => {
                write!(f, "StepCommitted(#{} {})", index, step)
            }
            SagaEvent::Compensated { step, index } => write!(f, "Compensated(#{} {})", index, step),
            SagaEvent::CompensationFailed { step, index, error } => {
                write!(f, "CompensationFailed(#{} {}, error={})", index, step, error)
            }
        }
    }
}
