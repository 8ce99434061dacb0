//! Which transaction faults are worth another attempt.

use crate::error::TransactionError;

pub const DEADLOCK_DETECTED: &str = "40P01";
pub const SERIALIZATION_FAILURE: &str = "40001";
pub const IDLE_IN_TRANSACTION_TIMEOUT: &str = "25P03";
pub const QUERY_CANCELED: &str = "57014";

/// SQLSTATE codes that describe a transient conflict rather than a bad request.
pub const RETRYABLE_SQLSTATES: [&str; 4] =
    [DEADLOCK_DETECTED, SERIALIZATION_FAILURE, IDLE_IN_TRANSACTION_TIMEOUT, QUERY_CANCELED];

const TRANSIENT_MARKERS: [&str; 3] = ["connection", "network", "timeout"];

/// `true` when a fresh transaction might succeed where this one failed.
pub fn is_retryable(error: &TransactionError) -> bool {
    match error {
        TransactionError::Database { code, message } => {
            RETRYABLE_SQLSTATES.contains(&code.as_str()) || mentions_transient_fault(message)
        }
        TransactionError::Connection(_) | TransactionError::Timeout(_) => true,
        TransactionError::Aborted(_) | TransactionError::RetriesExhausted { .. } => false,
    }
}

fn mentions_transient_fault(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker))
}

impl TransactionError {
    pub fn is_retryable(&self) -> bool {
        is_retryable(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn conflict_codes_are_retryable() {
        for code in RETRYABLE_SQLSTATES {
            assert!(TransactionError::database(code, "conflict").is_retryable(), "{code}");
        }
    }

    #[test]
    fn constraint_violations_are_not() {
        assert!(!TransactionError::database("23505", "duplicate key value").is_retryable());
        assert!(!TransactionError::aborted("task already closed").is_retryable());
    }

    #[test]
    fn transient_messages_are_retryable_whatever_the_code() {
        assert!(TransactionError::database("08006", "Connection reset by peer").is_retryable());
        assert!(TransactionError::database("XX000", "network unreachable").is_retryable());
        assert!(TransactionError::database("", "lock TIMEOUT").is_retryable());
        assert!(TransactionError::Connection("pool closed".into()).is_retryable());
        assert!(TransactionError::Timeout(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn exhausted_retries_are_final() {
        let err = TransactionError::RetriesExhausted {
            attempts: 4,
            last: Box::new(TransactionError::database(DEADLOCK_DETECTED, "deadlock")),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.root().code(), Some(DEADLOCK_DETECTED));
    }
}
