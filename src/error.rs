//! Error types for the resilience layer.
//!
//! Each subsystem raises its own classified error:
//! - [`CacheError`]: caller mistakes (bad key shape, bad TTL) and serialization failures.
//! - [`StoreError`]: the shared counter store could not answer. Never reaches the end user;
//!   the limiter converts it according to its failure policy.
//! - [`TransactionError`]: data-store faults, classified retryable or fatal.
//! - [`ConfigError`]: invalid configuration, rejected at construction.
//! - [`ResilienceError`]: the tower boundary, separating admission rejections from errors of
//!   the wrapped service.
use std::time::Duration;

use crate::rate_limit::RateLimitHeaders;

/// Errors raised by the cache engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The key or TTL supplied by the caller is malformed.
    #[error("invalid cache request: {0}")]
    Validation(String),
    /// The value could not be serialized on write or deserialized on read.
    #[error("cache value (de)serialization failed: {0}")]
    Serialization(String),
}

/// Faults talking to the shared counter store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store refused or dropped the connection.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
    /// The command did not complete within the client-side bound.
    #[error("counter store command timed out after {0:?}")]
    Timeout(Duration),
    /// The store answered with something the client cannot interpret.
    #[error("unexpected counter store reply: {0}")]
    Protocol(String),
}

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    MustBePositive { field: String },
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("failed to read configuration file: {0}")]
    Io(String),
}

impl ConfigError {
    pub(crate) fn positive(field: impl Into<String>) -> Self {
        ConfigError::MustBePositive { field: field.into() }
    }
}

/// Faults raised by a unit of work or by the transactional data store around it.
///
/// Whether a fault is worth retrying is decided by
/// [`TransactionError::is_retryable`](crate::transaction::classify).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    /// The database rejected a statement. `code` is the SQLSTATE when known.
    #[error("database error [{code}]: {message}")]
    Database { code: String, message: String },
    /// Connection-level failure (reset, refused, pool exhausted).
    #[error("connection failure: {0}")]
    Connection(String),
    /// The attempt exceeded its statement timeout.
    #[error("transaction attempt timed out after {0:?}")]
    Timeout(Duration),
    /// Non-retryable rejection raised by the unit of work itself (business rule, constraint).
    #[error("{0}")]
    Aborted(String),
    /// A retryable fault persisted through every allowed attempt.
    #[error("transaction failed after {attempts} attempts; last error: {last}")]
    RetriesExhausted { attempts: u32, last: Box<TransactionError> },
}

impl TransactionError {
    /// Shorthand for a database error with a SQLSTATE code.
    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        TransactionError::Database { code: code.into(), message: message.into() }
    }

    /// Shorthand for a non-retryable rejection.
    pub fn aborted(message: impl Into<String>) -> Self {
        TransactionError::Aborted(message.into())
    }

    /// SQLSTATE code, if this is a database error.
    pub fn code(&self) -> Option<&str> {
        match self {
            TransactionError::Database { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// The error that ended the last attempt, unwrapping `RetriesExhausted`.
    pub fn root(&self) -> &TransactionError {
        match self {
            TransactionError::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }

    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, TransactionError::RetriesExhausted { .. })
    }
}

/// Error surfaced by [`AdmissionService`](crate::rate_limit::AdmissionService).
#[derive(Debug, Clone)]
pub enum ResilienceError<E> {
    /// The caller exceeded its limit; map to `429 Too Many Requests`.
    RateLimited { retry_after: Duration, headers: RateLimitHeaders },
    /// The wrapped service failed.
    Inner(E),
}

impl<E: std::fmt::Display> std::fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited { .. } => write!(f, "too many requests"),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ResilienceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::RateLimited { .. } => None,
        }
    }
}

impl<E> ResilienceError<E> {
    /// Check if this error is an admission rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// HTTP status the outermost boundary should answer with, if the error is ours.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::Inner(_) => None,
        }
    }

    /// Seconds to advertise in `Retry-After`, if rejected.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            Self::Inner(_) => None,
        }
    }

    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn rate_limited_display_is_generic() {
        let err: ResilienceError<io::Error> = ResilienceError::RateLimited {
            retry_after: Duration::from_secs(10),
            headers: RateLimitHeaders::default(),
        };
        let msg = err.to_string();
        assert_eq!(msg, "too many requests");
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(10)));
        assert!(err.source().is_none());
    }

    #[test]
    fn inner_passes_through() {
        let err = ResilienceError::Inner(io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(!err.is_rate_limited());
        assert_eq!(err.status(), None);
        assert_eq!(err.to_string(), "boom");
        assert!(err.source().is_some());
        assert_eq!(err.into_inner().unwrap().to_string(), "boom");
    }

    #[test]
    fn root_unwraps_nested_exhaustion() {
        let deadlock = TransactionError::database("40P01", "deadlock detected");
        let err = TransactionError::RetriesExhausted { attempts: 4, last: Box::new(deadlock.clone()) };
        assert!(err.is_retries_exhausted());
        assert_eq!(err.root(), &deadlock);
        assert_eq!(err.root().code(), Some("40P01"));
        assert!(err.to_string().contains("4 attempts"));
        assert!(err.to_string().contains("deadlock detected"));
    }

    #[test]
    fn database_error_display_includes_code() {
        let err = TransactionError::database("23505", "duplicate key");
        assert_eq!(err.to_string(), "database error [23505]: duplicate key");
        assert_eq!(TransactionError::aborted("nope").code(), None);
    }
}
