//! Manager whose queries can be made to fail on demand.

use std::sync::atomic::{AtomicBool, Ordering};

use super::local::LocalTransactionManager;
use super::manager::{Result, TransactionError, TransactionHandle, TransactionManager};
use super::status::Status;

/// Wraps a [`LocalTransactionManager`]; `transaction()` and `status()` fail
/// once the matching switch is turned on.
#[derive(Default)]
pub(crate) struct FailingManager {
    inner: LocalTransactionManager,
    fail_transaction: AtomicBool,
    fail_status: AtomicBool,
}

impl FailingManager {
    pub(crate) fn inner(&self) -> &LocalTransactionManager {
        &self.inner
    }

    pub(crate) fn fail_transaction(&self) {
        self.fail_transaction.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_status(&self) {
        self.fail_status.store(true, Ordering::SeqCst);
    }

    fn check(&self, switch: &AtomicBool, what: &str) -> Result<()> {
        if switch.load(Ordering::SeqCst) {
            Err(TransactionError::System(format!("{} unavailable", what)))
        } else {
            Ok(())
        }
    }
}

impl TransactionManager for FailingManager {
    fn begin(&self) -> Result<()> {
        self.inner.begin()
    }

    fn commit(&self) -> Result<()> {
        self.inner.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.inner.rollback()
    }

    fn transaction(&self) -> Result<Option<TransactionHandle>> {
        self.check(&self.fail_transaction, "transaction")?;
        self.inner.transaction()
    }

    fn suspend(&self) -> Result<Option<TransactionHandle>> {
        self.inner.suspend()
    }

    fn resume(&self, tx: TransactionHandle) -> Result<()> {
        self.inner.resume(tx)
    }

    fn status(&self) -> Result<Status> {
        self.check(&self.fail_status, "status")?;
        self.inner.status()
    }

    fn set_transaction_timeout(&self, seconds: u32) -> Result<()> {
        self.inner.set_transaction_timeout(seconds)
    }

    fn transaction_timeout(&self) -> u32 {
        self.inner.transaction_timeout()
    }
}
