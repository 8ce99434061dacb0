//! Transactional execution with retry on transient faults, and sagas.
//!
//! [`TransactionRetryExecutor`] runs a unit of work inside a transaction opened by a
//! [`TransactionManager`], commits on success, and on failure rolls back and classifies the
//! error. Retryable faults (deadlock, serialization conflict, idle/statement timeout, dropped
//! connection) get a fresh transaction after an exponential pause; everything else propagates
//! unchanged.
//!
//! Units of work borrow the open transaction and return a boxed future tied to that borrow:
//!
//! ```rust,ignore
//! executor
//!     .execute_write(|tx| Box::pin(async move {
//!         sqlx::query("UPDATE tasks SET status = 'done' WHERE id = $1")
//!             .bind(task_id)
//!             .execute(&mut **tx)
//!             .await?;
//!         Ok(())
//!     }))
//!     .await?;
//! ```
//!
//! The closure may run several times; anything it moves into the future must be cloned per
//! attempt.

use async_trait::async_trait;

use crate::error::TransactionError;

pub mod classify;
pub mod executor;
pub mod options;
pub mod saga;

pub use classify::{is_retryable, RETRYABLE_SQLSTATES};
pub use executor::{TransactionRetryExecutor, TransactionRetryExecutorBuilder, UnitOfWorkFuture};
pub use options::{IsolationLevel, TransactionOptions};
pub use saga::SagaStep;

/// Opens, commits and rolls back transactions on the underlying data store.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Handle to an open transaction.
    type Transaction: Send;

    /// Open a transaction at `options.isolation_level`. When `options.timeout()` is set the
    /// store should enforce it as a statement timeout local to the transaction.
    async fn begin(&self, options: &TransactionOptions) -> Result<Self::Transaction, TransactionError>;

    async fn commit(&self, tx: Self::Transaction) -> Result<(), TransactionError>;

    async fn rollback(&self, tx: Self::Transaction) -> Result<(), TransactionError>;
}
