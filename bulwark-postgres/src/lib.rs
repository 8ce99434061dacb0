//! PostgreSQL transaction manager for `bulwark` (companion crate).
//!
//! Bring your own `PgPool`. Each attempt opens a pool transaction, sets its isolation level and
//! access mode, and applies the attempt timeout as `SET LOCAL statement_timeout`, so a slow
//! statement is cancelled by the server (SQLSTATE `57014`) and retried like any other transient
//! fault.

use async_trait::async_trait;
use bulwark::transaction::{TransactionManager, TransactionOptions};
use bulwark::TransactionError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

/// The transaction handle units of work receive. Run queries with `&mut **tx`.
pub type PgTransaction = Transaction<'static, Postgres>;

#[derive(Debug, Clone)]
pub struct PgTransactionManager {
    pool: PgPool,
}

impl PgTransactionManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, TransactionError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionManager for PgTransactionManager {
    type Transaction = PgTransaction;

    async fn begin(&self, options: &TransactionOptions) -> Result<PgTransaction, TransactionError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let mode = if options.read_only { "READ ONLY" } else { "READ WRITE" };
        let set_transaction =
            format!("SET TRANSACTION ISOLATION LEVEL {} {}", options.isolation_level.as_sql(), mode);
        sqlx::query(&set_transaction).execute(&mut *tx).await.map_err(map_sqlx_error)?;

        if let Some(timeout_ms) = options.timeout_ms {
            let set_timeout = format!("SET LOCAL statement_timeout = {timeout_ms}");
            sqlx::query(&set_timeout).execute(&mut *tx).await.map_err(map_sqlx_error)?;
        }

        tracing::trace!(
            target: "bulwark::postgres",
            isolation = %options.isolation_level,
            read_only = options.read_only,
            "transaction opened"
        );
        Ok(tx)
    }

    async fn commit(&self, tx: PgTransaction) -> Result<(), TransactionError> {
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(&self, tx: PgTransaction) -> Result<(), TransactionError> {
        tx.rollback().await.map_err(map_sqlx_error)
    }
}

/// Classify a driver error: server errors keep their SQLSTATE, transport and pool failures
/// become connection faults, anything else is final.
pub fn map_sqlx_error(e: sqlx::Error) -> TransactionError {
    match &e {
        sqlx::Error::Database(db) => TransactionError::database(
            db.code().map(|c| c.into_owned()).unwrap_or_default(),
            db.message(),
        ),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => TransactionError::Connection(e.to_string()),
        _ => TransactionError::aborted(e.to_string()),
    }
}

/// `?`-friendly conversion for query results inside units of work.
pub trait SqlxResultExt<T> {
    fn into_tx(self) -> Result<T, TransactionError>;
}

impl<T> SqlxResultExt<T> for Result<T, sqlx::Error> {
    fn into_tx(self) -> Result<T, TransactionError> {
        self.map_err(map_sqlx_error)
    }
}
