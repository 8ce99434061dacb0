use async_trait::async_trait;
use bulwark::transaction::{TransactionManager, TransactionOptions};
use bulwark::TransactionError;
use parking_lot::Mutex;
use std::sync::Arc;

/// Statements a unit of work ran inside one fake transaction.
#[derive(Debug, Default)]
pub struct FakeTx {
    pub statements: Vec<String>,
}

/// In-memory transaction manager: committed transactions append their statements to a shared
/// journal, rolled-back ones are discarded.
#[derive(Debug, Default, Clone)]
pub struct JournalManager {
    pub journal: Arc<Mutex<Vec<String>>>,
    pub begun: Arc<Mutex<Vec<TransactionOptions>>>,
    pub rollbacks: Arc<Mutex<u32>>,
}

impl JournalManager {
    pub fn committed(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    pub fn rollbacks(&self) -> u32 {
        *self.rollbacks.lock()
    }
}

#[async_trait]
impl TransactionManager for JournalManager {
    type Transaction = FakeTx;

    async fn begin(&self, options: &TransactionOptions) -> Result<FakeTx, TransactionError> {
        self.begun.lock().push(options.clone());
        Ok(FakeTx::default())
    }

    async fn commit(&self, tx: FakeTx) -> Result<(), TransactionError> {
        self.journal.lock().extend(tx.statements);
        Ok(())
    }

    async fn rollback(&self, _tx: FakeTx) -> Result<(), TransactionError> {
        *self.rollbacks.lock() += 1;
        Ok(())
    }
}
