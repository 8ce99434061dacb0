//! Jitter for retry delays.
//!
//! - `None`: exact backoff delay. The transaction executor's default, so the
//!   `2^n`-second schedule is observable.
//! - `Full`: uniform in `[0, delay]`.
//! - `Equal`: uniform in `[delay/2, delay]`, keeps a floor while spreading retries.
//!
//! Enable jitter when many instances retry against the same database after a shared fault,
//! so their retries do not line up.

use rand::{rng, Rng};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Jitter strategy for randomizing retry delays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jitter {
    #[default]
    None,
    Full,
    Equal,
}

impl Jitter {
    /// Apply jitter to a delay duration
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rng())
    }

    /// Apply jitter with a caller-supplied RNG (deterministic in tests).
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Jitter::None => delay,
            _ if millis == 0 => Duration::ZERO,
            Jitter::Full => Duration::from_millis(rng.random_range(0..=millis)),
            Jitter::Equal => Duration::from_millis(rng.random_range(millis / 2..=millis)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn none_is_identity() {
        assert_eq!(Jitter::None.apply(Duration::from_secs(2)), Duration::from_secs(2));
    }

    #[test]
    fn full_stays_within_delay() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let d = Jitter::Full.apply_with_rng(Duration::from_millis(1_000), &mut rng);
            assert!(d <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn equal_keeps_half_floor() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let d = Jitter::Equal.apply_with_rng(Duration::from_millis(1_000), &mut rng);
            assert!(d >= Duration::from_millis(500));
            assert!(d <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn zero_delay_stays_zero() {
        assert_eq!(Jitter::Full.apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(Jitter::Equal.apply(Duration::ZERO), Duration::ZERO);
    }
}
