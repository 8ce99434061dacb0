//! Backoff between transaction attempts.
//!
//! Delays are indexed by retry count: `delay(0)` is the pause before the first retry,
//! `delay(1)` before the second, and so on. The transaction executor defaults to
//! `Backoff::exponential(1s)`, i.e. 1s, 2s, 4s, ...
//!
//! ```rust
//! use std::time::Duration;
//! use bulwark::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_secs(1))
//!     .with_max(Duration::from_secs(5))
//!     .unwrap();
//! assert_eq!(backoff.delay(0), Duration::from_secs(1));
//! assert_eq!(backoff.delay(2), Duration::from_secs(4));
//! assert_eq!(backoff.delay(3), Duration::from_secs(5)); // capped
//! ```
//!
//! Computations that would overflow saturate to [`MAX_BACKOFF`].

use std::time::Duration;

/// Maximum delay used when calculations overflow (1 hour).
pub const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffError {
    #[error("with_max is only valid for exponential backoff")]
    ConstantDoesNotSupportMax,
    #[error("max must be greater than zero")]
    MaxMustBePositive,
    #[error("max ({max:?}) must be >= base ({base:?})")]
    MaxLessThanBase { base: Duration, max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Constant(Duration),
    Exponential { base: Duration, max: Option<Duration> },
}

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    kind: Kind,
}

impl Backoff {
    /// Same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self { kind: Kind::Constant(delay) }
    }

    /// `base * 2^retry_count`.
    pub fn exponential(base: Duration) -> Self {
        Self { kind: Kind::Exponential { base, max: None } }
    }

    /// Cap an exponential schedule.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self.kind {
            Kind::Exponential { base, max: existing } => {
                if max < *base {
                    return Err(BackoffError::MaxLessThanBase { base: *base, max });
                }
                *existing = Some(max);
                Ok(self)
            }
            Kind::Constant(_) => Err(BackoffError::ConstantDoesNotSupportMax),
        }
    }

    /// Delay before retry number `retry_count` (0-based).
    pub fn delay(&self, retry_count: u32) -> Duration {
        match self.kind {
            Kind::Constant(delay) => delay.min(MAX_BACKOFF),
            Kind::Exponential { base, max } => {
                let multiplier = 2u128.saturating_pow(retry_count);
                let nanos = base.as_nanos().saturating_mul(multiplier).min(MAX_BACKOFF.as_nanos());
                let delay = Duration::from_nanos(nanos as u64);
                max.map(|m| delay.min(m)).unwrap_or(delay)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1))
    }
}
