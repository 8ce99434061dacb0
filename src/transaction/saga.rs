//! Sagas: sequences of transactional steps with compensations.
//!
//! Each step's `execute` runs in its own transaction. When a later step fails, the
//! compensations of every step that already committed run in reverse completion order, each
//! in its own transaction. A failing compensation is logged and reported as an event; the
//! caller always receives the error of the step that failed.

use std::fmt;

use crate::error::TransactionError;
use crate::telemetry::{emit_best_effort, PolicyEvent, SagaEvent, TelemetrySink};
use crate::transaction::executor::{TransactionRetryExecutor, UnitOfWorkFuture};
use crate::transaction::options::TransactionOptions;
use crate::transaction::TransactionManager;

type ExecuteFn<Tx, T> = Box<dyn for<'t> FnMut(&'t mut Tx) -> UnitOfWorkFuture<'t, T> + Send>;
type CompensateFn<Tx, T> = Box<dyn for<'t> FnMut(&'t mut Tx, T) -> UnitOfWorkFuture<'t, ()> + Send>;

/// One step of a saga. `compensate` receives a clone of the value `execute` produced.
pub struct SagaStep<Tx, T> {
    name: String,
    execute: ExecuteFn<Tx, T>,
    compensate: CompensateFn<Tx, T>,
}

impl<Tx, T> SagaStep<Tx, T> {
    pub fn new<E, C>(name: impl Into<String>, execute: E, compensate: C) -> Self
    where
        E: for<'t> FnMut(&'t mut Tx) -> UnitOfWorkFuture<'t, T> + Send + 'static,
        C: for<'t> FnMut(&'t mut Tx, T) -> UnitOfWorkFuture<'t, ()> + Send + 'static,
    {
        Self { name: name.into(), execute: Box::new(execute), compensate: Box::new(compensate) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<Tx, T> fmt::Debug for SagaStep<Tx, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SagaStep").field("name", &self.name).finish_non_exhaustive()
    }
}

struct Completed<Tx, T> {
    index: usize,
    name: String,
    compensate: CompensateFn<Tx, T>,
    value: T,
}

impl<M, S> TransactionRetryExecutor<M, S>
where
    M: TransactionManager,
    S: TelemetrySink,
{
    /// Run `steps` in order, each through
    /// [`execute_in_transaction`](Self::execute_in_transaction) with `options`.
    ///
    /// Returns every step's result on success. On failure, compensates the committed steps
    /// newest first and returns the failing step's error.
    pub async fn execute_saga<T>(
        &self,
        steps: Vec<SagaStep<M::Transaction, T>>,
        options: TransactionOptions,
    ) -> Result<Vec<T>, TransactionError>
    where
        T: Clone + Send,
    {
        let mut completed: Vec<Completed<M::Transaction, T>> = Vec::with_capacity(steps.len());
        let mut results = Vec::with_capacity(steps.len());

        for (index, step) in steps.into_iter().enumerate() {
            let SagaStep { name, mut execute, compensate } = step;
            match self.execute_in_transaction(options.clone(), &mut execute).await {
                Ok(value) => {
                    tracing::debug!(step = %name, index, "saga step committed");
                    emit_best_effort(
                        self.sink.clone(),
                        PolicyEvent::Saga(SagaEvent::StepCommitted { step: name.clone(), index }),
                    )
                    .await;
                    completed.push(Completed { index, name, compensate, value: value.clone() });
                    results.push(value);
                }
                Err(err) => {
                    tracing::warn!(step = %name, index, error = %err, "saga step failed; compensating");
                    self.compensate(completed, &options).await;
                    return Err(err);
                }
            }
        }
        Ok(results)
    }

    async fn compensate<T>(&self, completed: Vec<Completed<M::Transaction, T>>, options: &TransactionOptions)
    where
        T: Clone + Send,
    {
        for Completed { index, name, mut compensate, value } in completed.into_iter().rev() {
            let result = self
                .execute_in_transaction(options.clone(), move |tx| compensate(tx, value.clone()))
                .await;
            let event = match result {
                Ok(()) => {
                    tracing::info!(step = %name, index, "saga step compensated");
                    SagaEvent::Compensated { step: name, index }
                }
                Err(err) => {
                    tracing::error!(step = %name, index, error = %err, "saga compensation failed");
                    SagaEvent::CompensationFailed { step: name, index, error: err.to_string() }
                }
            };
            emit_best_effort(self.sink.clone(), PolicyEvent::Saga(event)).await;
        }
    }
}
