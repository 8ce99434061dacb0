//! Retry loop around a transaction manager.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backoff::Backoff;
use crate::error::{ConfigError, TransactionError};
use crate::jitter::Jitter;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::telemetry::{emit_best_effort, NullSink, PolicyEvent, RetryEvent, TelemetrySink};
use crate::transaction::classify::is_retryable;
use crate::transaction::options::TransactionOptions;
use crate::transaction::TransactionManager;

/// Future returned by a unit of work, borrowing the open transaction for `'t`.
pub type UnitOfWorkFuture<'t, R> = BoxFuture<'t, Result<R, TransactionError>>;

/// Runs units of work in transactions, retrying transient faults with exponential backoff.
pub struct TransactionRetryExecutor<M, T = NullSink> {
    pub(super) manager: M,
    backoff: Backoff,
    jitter: Jitter,
    sleeper: Arc<dyn Sleeper>,
    pub(super) sink: T,
}

impl<M: std::fmt::Debug, T> std::fmt::Debug for TransactionRetryExecutor<M, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionRetryExecutor")
            .field("manager", &self.manager)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl<M: TransactionManager> TransactionRetryExecutor<M, NullSink> {
    /// Executor with the default schedule: 1s, 2s, 4s, ... without jitter.
    pub fn new(manager: M) -> Self {
        Self {
            manager,
            backoff: Backoff::default(),
            jitter: Jitter::None,
            sleeper: Arc::new(TokioSleeper),
            sink: NullSink,
        }
    }

    pub fn builder(manager: M) -> TransactionRetryExecutorBuilder<M, NullSink> {
        TransactionRetryExecutorBuilder { executor: Self::new(manager) }
    }
}

impl<M, T> TransactionRetryExecutor<M, T> {
    pub fn manager(&self) -> &M {
        &self.manager
    }
}

impl<M, T> TransactionRetryExecutor<M, T>
where
    M: TransactionManager,
    T: TelemetrySink,
{
    /// Run `work` in a transaction opened with `options`, retrying retryable faults up to
    /// `options.max_retries` times.
    ///
    /// Returns the first non-retryable error unchanged, or
    /// [`TransactionError::RetriesExhausted`] when the retry budget runs out.
    pub async fn execute_in_transaction<R, F>(
        &self,
        options: TransactionOptions,
        mut work: F,
    ) -> Result<R, TransactionError>
    where
        F: for<'t> FnMut(&'t mut M::Transaction) -> UnitOfWorkFuture<'t, R> + Send,
        R: Send,
    {
        options.validate().map_err(|e| TransactionError::aborted(e.to_string()))?;
        let started = Instant::now();
        let mut retry_count: u32 = 0;

        loop {
            let err = match self.attempt(&options, &mut work).await {
                Ok(value) => {
                    if retry_count > 0 {
                        tracing::info!(retries = retry_count, "transaction succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !is_retryable(&err) {
                tracing::debug!(error = %err, "transaction failed with non-retryable error");
                return Err(err);
            }

            if retry_count >= options.max_retries {
                let attempts = retry_count + 1;
                tracing::error!(attempts, error = %err, "transaction retries exhausted");
                emit_best_effort(
                    self.sink.clone(),
                    PolicyEvent::Retry(RetryEvent::Exhausted {
                        total_attempts: attempts,
                        total_duration: started.elapsed(),
                    }),
                )
                .await;
                return Err(TransactionError::RetriesExhausted { attempts, last: Box::new(err) });
            }

            let delay = self.jitter.apply(self.backoff.delay(retry_count));
            retry_count += 1;
            tracing::warn!(
                attempt = retry_count,
                max_retries = options.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying transaction"
            );
            emit_best_effort(
                self.sink.clone(),
                PolicyEvent::Retry(RetryEvent::Attempt {
                    attempt: retry_count,
                    delay,
                    cause: cause_of(&err),
                }),
            )
            .await;
            self.sleeper.sleep(delay).await;
        }
    }

    /// [`execute_in_transaction`](Self::execute_in_transaction) with
    /// [`TransactionOptions::read_only`].
    pub async fn execute_read_only<R, F>(&self, work: F) -> Result<R, TransactionError>
    where
        F: for<'t> FnMut(&'t mut M::Transaction) -> UnitOfWorkFuture<'t, R> + Send,
        R: Send,
    {
        self.execute_in_transaction(TransactionOptions::read_only(), work).await
    }

    /// [`execute_in_transaction`](Self::execute_in_transaction) with
    /// [`TransactionOptions::write`] (serializable).
    pub async fn execute_write<R, F>(&self, work: F) -> Result<R, TransactionError>
    where
        F: for<'t> FnMut(&'t mut M::Transaction) -> UnitOfWorkFuture<'t, R> + Send,
        R: Send,
    {
        self.execute_in_transaction(TransactionOptions::write(), work).await
    }

    async fn attempt<R, F>(&self, options: &TransactionOptions, work: &mut F) -> Result<R, TransactionError>
    where
        F: for<'t> FnMut(&'t mut M::Transaction) -> UnitOfWorkFuture<'t, R> + Send,
        R: Send,
    {
        let mut tx = self.manager.begin(options).await?;

        let result = match options.timeout() {
            Some(limit) => tokio::time::timeout(limit, work(&mut tx))
                .await
                .unwrap_or(Err(TransactionError::Timeout(limit))),
            None => work(&mut tx).await,
        };

        match result {
            Ok(value) => {
                self.manager.commit(tx).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.manager.rollback(tx).await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

fn cause_of(err: &TransactionError) -> String {
    match err {
        TransactionError::Database { code, .. } if !code.is_empty() => code.clone(),
        TransactionError::Database { .. } => "database".to_string(),
        TransactionError::Connection(_) => "connection".to_string(),
        TransactionError::Timeout(_) => "timeout".to_string(),
        TransactionError::Aborted(_) => "aborted".to_string(),
        TransactionError::RetriesExhausted { .. } => "retries_exhausted".to_string(),
    }
}

/// Builder for [`TransactionRetryExecutor`].
pub struct TransactionRetryExecutorBuilder<M, T> {
    executor: TransactionRetryExecutor<M, T>,
}

impl<M, T> TransactionRetryExecutorBuilder<M, T> {
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.executor.backoff = backoff;
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.executor.jitter = jitter;
        self
    }

    pub fn sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.executor.sleeper = Arc::new(sleeper);
        self
    }

    pub fn sink<T2: TelemetrySink>(self, sink: T2) -> TransactionRetryExecutorBuilder<M, T2> {
        let TransactionRetryExecutor { manager, backoff, jitter, sleeper, .. } = self.executor;
        TransactionRetryExecutorBuilder {
            executor: TransactionRetryExecutor { manager, backoff, jitter, sleeper, sink },
        }
    }

    pub fn build(self) -> Result<TransactionRetryExecutor<M, T>, ConfigError> {
        if self.executor.backoff.delay(0) == Duration::ZERO {
            return Err(ConfigError::positive("transaction.backoff base"));
        }
        Ok(self.executor)
    }
}
