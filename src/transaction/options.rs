//! Per-call transaction options.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

/// SQL isolation levels, weakest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// The level as it appears in `SET TRANSACTION ISOLATION LEVEL ...`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionOptions {
    pub isolation_level: IsolationLevel,
    /// Statement timeout for each attempt; `None` leaves the store's default.
    pub timeout_ms: Option<u64>,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Open the transaction `READ ONLY`.
    pub read_only: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            isolation_level: IsolationLevel::ReadCommitted,
            timeout_ms: None,
            max_retries: 3,
            read_only: false,
        }
    }
}

impl TransactionOptions {
    /// Read committed, read only.
    pub fn read_only() -> Self {
        Self { read_only: true, ..Self::default() }
    }

    /// Serializable, read-write.
    pub fn write() -> Self {
        Self { isolation_level: IsolationLevel::Serializable, ..Self::default() }
    }

    pub fn with_isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::positive("transaction.timeout_ms"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrappers_fix_isolation() {
        assert_eq!(TransactionOptions::default().isolation_level, IsolationLevel::ReadCommitted);
        assert_eq!(TransactionOptions::write().isolation_level, IsolationLevel::Serializable);
        let ro = TransactionOptions::read_only();
        assert!(ro.read_only);
        assert_eq!(ro.isolation_level, IsolationLevel::ReadCommitted);
        assert_eq!(ro.max_retries, 3);
    }

    #[test]
    fn levels_render_as_sql() {
        assert_eq!(IsolationLevel::RepeatableRead.as_sql(), "REPEATABLE READ");
        assert_eq!(IsolationLevel::Serializable.to_string(), "SERIALIZABLE");
        assert!(IsolationLevel::ReadUncommitted < IsolationLevel::Serializable);
    }

    #[test]
    fn deserializes_kebab_case_levels() {
        let opts: TransactionOptions =
            serde_json::from_str(r#"{ "isolation_level": "repeatable-read", "timeout_ms": 2500 }"#)
                .unwrap();
        assert_eq!(opts.isolation_level, IsolationLevel::RepeatableRead);
        assert_eq!(opts.timeout(), Some(Duration::from_millis(2_500)));
        assert_eq!(opts.max_retries, 3);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let opts = TransactionOptions { timeout_ms: Some(0), ..TransactionOptions::default() };
        assert_eq!(opts.validate(), Err(ConfigError::positive("transaction.timeout_ms")));
        assert!(TransactionOptions::write().with_timeout(Duration::from_secs(5)).validate().is_ok());
    }
}
