//! Scoped transaction state changes that are undone on every exit path.

use crate::transaction::{TransactionError, TransactionHandle, TransactionManager};

/// Keeps the caller's transaction suspended until dropped, then resumes it.
pub struct SuspendGuard<'a> {
    tm: &'a dyn TransactionManager,
    suspended: Option<TransactionHandle>,
}

impl<'a> SuspendGuard<'a> {
    /// Suspends whatever transaction is associated with the calling context.
    pub fn suspend(tm: &'a dyn TransactionManager) -> Result<Self, TransactionError> {
        let suspended = tm.suspend()?;
        Ok(Self { tm, suspended })
    }

    pub fn transaction(&self) -> Option<&TransactionHandle> {
        self.suspended.as_ref()
    }
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        if let Some(tx) = self.suspended.take() {
            let id = tx.id();
            if let Err(e) = self.tm.resume(tx) {
                log::error!("failed to resume suspended transaction {}: {}", id, e);
            }
        }
    }
}

/// Restores the manager's transaction timeout when dropped.
pub struct TimeoutGuard<'a> {
    tm: &'a dyn TransactionManager,
    previous: u32,
}

impl<'a> TimeoutGuard<'a> {
    pub fn new(tm: &'a dyn TransactionManager) -> Self {
        Self {
            tm,
            previous: tm.transaction_timeout(),
        }
    }

    /// Applies a per-method override; `None` leaves the current setting.
    pub fn apply(&self, seconds: Option<u32>) -> Result<(), TransactionError> {
        match seconds {
            Some(seconds) => self.tm.set_transaction_timeout(seconds),
            None => Ok(()),
        }
    }
}

impl Drop for TimeoutGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.tm.set_transaction_timeout(self.previous) {
            log::error!("failed to restore transaction timeout {}: {}", self.previous, e);
        }
    }
}
