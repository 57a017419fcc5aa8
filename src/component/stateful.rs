//! Per-instance state of stateful components.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::concurrency::OwnerLock;
use crate::transaction::{TransactionError, TransactionHandle, TransactionId, TransactionManager};

/// Who holds a stateful instance: its transaction if there is one, else the calling thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockOwner {
    Transaction(TransactionId),
    Thread(ThreadId),
}

impl LockOwner {
    /// Owner token for the calling context.
    pub fn current(tm: &dyn TransactionManager) -> Result<Self, TransactionError> {
        Ok(match tm.transaction()? {
            Some(tx) => Self::Transaction(tx.id()),
            None => Self::Thread(thread::current().id()),
        })
    }
}

/// One stateful component instance.
#[derive(Debug)]
pub struct StatefulInstance {
    id: String,
    lock: OwnerLock<LockOwner>,
    /// Bean-managed transaction left open by the previous call.
    transaction: Mutex<Option<TransactionHandle>>,
    removed: AtomicBool,
}

impl StatefulInstance {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            lock: OwnerLock::new(),
            transaction: Mutex::new(None),
            removed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lock(&self) -> &OwnerLock<LockOwner> {
        &self.lock
    }

    pub fn take_transaction(&self) -> Option<TransactionHandle> {
        self.transaction.lock().take()
    }

    pub fn remember_transaction(&self, tx: Option<TransactionHandle>) {
        *self.transaction.lock() = tx;
    }

    /// Id of the bean-managed transaction waiting for the next call, if any.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction.lock().as_ref().map(|tx| tx.id())
    }

    /// Marks the instance as gone; further invocations fail with `NoSuchInstance`.
    pub fn remove(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }
}
