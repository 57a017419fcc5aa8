//! In-process transaction manager.
//!
//! Associates at most one transaction with each calling thread. There are no
//! resources enlisted and nothing is logged durably; the manager exists so the
//! interceptors can run against real begin/commit/suspend semantics in the
//! simulator and in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::id::{TransactionId, TransactionIdGenerator};
use super::manager::{Result, Transaction, TransactionError, TransactionHandle, TransactionManager};
use super::status::Status;

/// Default transaction timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u32 = 300;

#[derive(Debug)]
struct TxState {
    status: Status,
    deadline: Option<Instant>,
}

/// A transaction owned by [`LocalTransactionManager`].
#[derive(Debug)]
pub struct LocalTransaction {
    id: TransactionId,
    state: Mutex<TxState>,
    counters: Arc<Counters>,
}

impl LocalTransaction {
    fn new(id: TransactionId, timeout: Option<Duration>, counters: Arc<Counters>) -> Self {
        let started = Instant::now();
        Self {
            id,
            state: Mutex::new(TxState {
                status: Status::Active,
                deadline: timeout.map(|t| started + t),
            }),
            counters,
        }
    }

    /// Current status, rolling the transaction back first if its deadline passed.
    fn observe(&self) -> Status {
        let mut state = self.state.lock();
        if state.status.is_open() {
            if let Some(deadline) = state.deadline {
                if Instant::now() >= deadline {
                    log::debug!("{} timed out, rolling back", self.id);
                    state.status = Status::RolledBack;
                    self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        state.status
    }

    fn transition(&self, to: Status) {
        let mut state = self.state.lock();
        if to == Status::RolledBack && state.status != Status::RolledBack {
            self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        }
        if to == Status::Committed {
            self.counters.committed.fetch_add(1, Ordering::SeqCst);
        }
        state.status = to;
    }

    /// Rolls the transaction back as a timeout reaper would, without touching
    /// any thread association.
    pub fn expire(&self) {
        if self.observe().is_open() {
            self.transition(Status::RolledBack);
        }
    }

    /// Overrides the status, simulating a resource manager that left the
    /// transaction somewhere unusual.
    pub fn force_status(&self, status: Status) {
        self.state.lock().status = status;
    }
}

impl Transaction for LocalTransaction {
    fn id(&self) -> TransactionId {
        self.id
    }

    fn status(&self) -> Result<Status> {
        Ok(self.observe())
    }

    fn set_rollback_only(&self) -> Result<()> {
        match self.observe() {
            Status::Active => {
                self.transition(Status::MarkedRollback);
                Ok(())
            }
            Status::MarkedRollback => Ok(()),
            status => Err(TransactionError::NotActive {
                id: self.id,
                status,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    suspended: AtomicU64,
    resumed: AtomicU64,
}

/// Snapshot of what a [`LocalTransactionManager`] has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub suspended: u64,
    pub resumed: u64,
}

impl std::fmt::Display for TransactionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "begun={} committed={} rolled_back={} suspended={} resumed={}",
            self.begun, self.committed, self.rolled_back, self.suspended, self.resumed
        )
    }
}

/// Thread-associated transaction manager.
pub struct LocalTransactionManager {
    ids: TransactionIdGenerator,
    /// Transactions that are associated with a thread or suspended. An entry
    /// leaves when its transaction is committed or rolled back through the manager.
    transactions: DashMap<TransactionId, Arc<LocalTransaction>>,
    associations: DashMap<ThreadId, Arc<LocalTransaction>>,
    timeouts: DashMap<ThreadId, u32>,
    default_timeout: u32,
    counters: Arc<Counters>,
}

impl LocalTransactionManager {
    pub fn new() -> Self {
        Self::with_default_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a manager whose transactions time out after `seconds` unless
    /// the caller overrides it. Zero disables the timeout.
    pub fn with_default_timeout(seconds: u32) -> Self {
        Self {
            ids: TransactionIdGenerator::new(),
            transactions: DashMap::new(),
            associations: DashMap::new(),
            timeouts: DashMap::new(),
            default_timeout: seconds,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> TransactionStats {
        TransactionStats {
            begun: self.counters.begun.load(Ordering::SeqCst),
            committed: self.counters.committed.load(Ordering::SeqCst),
            rolled_back: self.counters.rolled_back.load(Ordering::SeqCst),
            suspended: self.counters.suspended.load(Ordering::SeqCst),
            resumed: self.counters.resumed.load(Ordering::SeqCst),
        }
    }

    /// A transaction that has not been ended yet.
    pub fn lookup(&self, id: TransactionId) -> Option<Arc<LocalTransaction>> {
        self.transactions.get(&id).map(|tx| Arc::clone(tx.value()))
    }

    /// The transaction associated with the calling thread, as its concrete type.
    pub fn current(&self) -> Option<Arc<LocalTransaction>> {
        self.associations
            .get(&thread::current().id())
            .map(|tx| Arc::clone(tx.value()))
    }

    pub fn active_transactions(&self) -> Vec<TransactionId> {
        self.transactions
            .iter()
            .filter(|entry| entry.value().observe().is_open())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Number of transactions not yet ended through the manager.
    pub fn tracked(&self) -> usize {
        self.transactions.len()
    }

    /// Forgets suspended transactions the timeout reaper rolled back. Nothing
    /// can end them through the manager until they are resumed, and a caller
    /// that abandoned them never will. Returns how many were dropped.
    pub fn cleanup_finished(&self) -> usize {
        let before = self.transactions.len();
        self.transactions
            .retain(|_, tx| !tx.observe().is_finished());
        before - self.transactions.len()
    }

    fn effective_timeout(&self, thread: ThreadId) -> Option<Duration> {
        let seconds = self
            .timeouts
            .get(&thread)
            .map(|t| *t.value())
            .unwrap_or(self.default_timeout);
        (seconds > 0).then(|| Duration::from_secs(u64::from(seconds)))
    }

    fn take_association(&self) -> Result<Arc<LocalTransaction>> {
        self.associations
            .remove(&thread::current().id())
            .map(|(_, tx)| tx)
            .ok_or(TransactionError::NoTransaction)
    }

    fn forget(&self, tx: &LocalTransaction) {
        self.transactions.remove(&tx.id);
    }
}

impl Default for LocalTransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager for LocalTransactionManager {
    fn begin(&self) -> Result<()> {
        let thread = thread::current().id();
        if let Some(existing) = self.associations.get(&thread) {
            return Err(TransactionError::AlreadyAssociated(existing.id));
        }

        let tx = Arc::new(LocalTransaction::new(
            self.ids.next(),
            self.effective_timeout(thread),
            Arc::clone(&self.counters),
        ));
        log::debug!("begin {}", tx.id);
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        self.transactions.insert(tx.id, Arc::clone(&tx));
        self.associations.insert(thread, tx);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let tx = self.take_association()?;
        match tx.observe() {
            Status::Active => {
                tx.transition(Status::Committed);
                self.forget(&tx);
                log::debug!("commit {}", tx.id);
                Ok(())
            }
            Status::MarkedRollback => {
                tx.transition(Status::RolledBack);
                self.forget(&tx);
                log::debug!("commit of {} turned into rollback", tx.id);
                Err(TransactionError::RolledBack {
                    id: tx.id,
                    reason: "transaction was marked rollback-only".to_string(),
                })
            }
            Status::RolledBack => {
                self.forget(&tx);
                Err(TransactionError::RolledBack {
                    id: tx.id,
                    reason: "transaction timed out".to_string(),
                })
            }
            status => {
                let id = tx.id;
                self.associations.insert(thread::current().id(), tx);
                Err(TransactionError::NotActive { id, status })
            }
        }
    }

    fn rollback(&self) -> Result<()> {
        let tx = self.take_association()?;
        // Disassociated either way, so nothing could end it later.
        self.forget(&tx);
        match tx.observe() {
            Status::Active | Status::MarkedRollback | Status::Unknown | Status::RolledBack => {
                tx.transition(Status::RolledBack);
                log::debug!("rollback {}", tx.id);
                Ok(())
            }
            status => Err(TransactionError::NotActive { id: tx.id, status }),
        }
    }

    fn transaction(&self) -> Result<Option<TransactionHandle>> {
        Ok(self.current().map(|tx| tx as TransactionHandle))
    }

    fn suspend(&self) -> Result<Option<TransactionHandle>> {
        let suspended = self.associations.remove(&thread::current().id());
        Ok(suspended.map(|(_, tx)| {
            log::debug!("suspend {}", tx.id);
            self.counters.suspended.fetch_add(1, Ordering::SeqCst);
            tx as TransactionHandle
        }))
    }

    fn resume(&self, tx: TransactionHandle) -> Result<()> {
        let thread = thread::current().id();
        if let Some(existing) = self.associations.get(&thread) {
            return Err(TransactionError::AlreadyAssociated(existing.id));
        }
        let local = self
            .lookup(tx.id())
            .ok_or(TransactionError::Unknown(tx.id()))?;
        log::debug!("resume {}", local.id);
        self.counters.resumed.fetch_add(1, Ordering::SeqCst);
        self.associations.insert(thread, local);
        Ok(())
    }

    fn status(&self) -> Result<Status> {
        Ok(self
            .current()
            .map(|tx| tx.observe())
            .unwrap_or(Status::NoTransaction))
    }

    fn set_transaction_timeout(&self, seconds: u32) -> Result<()> {
        let thread = thread::current().id();
        if seconds == 0 {
            self.timeouts.remove(&thread);
        } else {
            self.timeouts.insert(thread, seconds);
        }
        Ok(())
    }

    fn transaction_timeout(&self) -> u32 {
        self.timeouts
            .get(&thread::current().id())
            .map(|t| *t.value())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_commit() {
        let tm = LocalTransactionManager::new();
        assert_eq!(tm.status().unwrap(), Status::NoTransaction);

        tm.begin().unwrap();
        let tx = tm.transaction().unwrap().unwrap();
        assert_eq!(tx.status().unwrap(), Status::Active);

        tm.commit().unwrap();
        assert!(tm.transaction().unwrap().is_none());
        assert_eq!(tx.status().unwrap(), Status::Committed);
        assert_eq!(
            tm.stats(),
            TransactionStats {
                begun: 1,
                committed: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_nested_begin_is_rejected() {
        let tm = LocalTransactionManager::new();
        tm.begin().unwrap();
        assert!(matches!(
            tm.begin(),
            Err(TransactionError::AlreadyAssociated(_))
        ));
    }

    #[test]
    fn test_commit_of_marked_transaction_rolls_back() {
        let tm = LocalTransactionManager::new();
        tm.begin().unwrap();
        let tx = tm.transaction().unwrap().unwrap();
        tx.set_rollback_only().unwrap();

        let err = tm.commit().unwrap_err();
        assert!(err.is_rollback());
        assert_eq!(tx.status().unwrap(), Status::RolledBack);
        assert_eq!(tm.stats().rolled_back, 1);
        assert_eq!(tm.stats().committed, 0);
    }

    #[test]
    fn test_commit_without_transaction() {
        let tm = LocalTransactionManager::new();
        assert_eq!(tm.commit(), Err(TransactionError::NoTransaction));
        assert_eq!(tm.rollback(), Err(TransactionError::NoTransaction));
    }

    #[test]
    fn test_suspend_resume() {
        let tm = LocalTransactionManager::new();
        tm.begin().unwrap();
        let original = tm.transaction().unwrap().unwrap();

        let suspended = tm.suspend().unwrap().unwrap();
        assert_eq!(tm.status().unwrap(), Status::NoTransaction);

        tm.begin().unwrap();
        tm.commit().unwrap();

        tm.resume(suspended).unwrap();
        assert_eq!(tm.transaction().unwrap().unwrap().id(), original.id());

        let stats = tm.stats();
        assert_eq!(stats.suspended, 1);
        assert_eq!(stats.resumed, 1);
    }

    #[test]
    fn test_suspend_without_transaction_is_noop() {
        let tm = LocalTransactionManager::new();
        assert!(tm.suspend().unwrap().is_none());
        assert_eq!(tm.stats().suspended, 0);
    }

    #[test]
    fn test_association_is_per_thread() {
        let tm = Arc::new(LocalTransactionManager::new());
        tm.begin().unwrap();

        let other = Arc::clone(&tm);
        let seen = thread::spawn(move || other.status().unwrap())
            .join()
            .unwrap();

        assert_eq!(seen, Status::NoTransaction);
        assert_eq!(tm.status().unwrap(), Status::Active);
    }

    #[test]
    fn test_expired_transaction_reports_rolled_back() {
        let tm = LocalTransactionManager::new();
        tm.begin().unwrap();
        let tx = tm.current().unwrap();

        tx.expire();

        assert_eq!(tm.status().unwrap(), Status::RolledBack);
        assert!(tm.commit().unwrap_err().is_rollback());
        assert_eq!(tm.stats().rolled_back, 1);
    }

    #[test]
    fn test_rollback_clears_already_rolled_back_association() {
        let tm = LocalTransactionManager::new();
        tm.begin().unwrap();
        tm.current().unwrap().expire();

        tm.rollback().unwrap();
        assert!(tm.transaction().unwrap().is_none());
        assert_eq!(tm.stats().rolled_back, 1);
    }

    #[test]
    fn test_timeout_setting_is_per_thread() {
        let tm = LocalTransactionManager::new();
        assert_eq!(tm.transaction_timeout(), 0);

        tm.set_transaction_timeout(30).unwrap();
        assert_eq!(tm.transaction_timeout(), 30);

        tm.set_transaction_timeout(0).unwrap();
        assert_eq!(tm.transaction_timeout(), 0);
    }

    #[test]
    fn test_ended_transactions_are_not_retained() {
        let tm = LocalTransactionManager::new();
        tm.begin().unwrap();
        tm.commit().unwrap();
        tm.begin().unwrap();
        tm.rollback().unwrap();
        tm.begin().unwrap();
        tm.transaction().unwrap().unwrap().set_rollback_only().unwrap();
        assert!(tm.commit().is_err());
        tm.begin().unwrap();
        let open = tm.transaction().unwrap().unwrap().id();

        assert_eq!(tm.tracked(), 1);
        assert_eq!(tm.active_transactions(), vec![open]);
        assert!(tm.lookup(open).is_some());
    }

    #[test]
    fn test_suspended_transaction_stays_until_ended() {
        let tm = LocalTransactionManager::new();
        tm.begin().unwrap();
        let suspended = tm.suspend().unwrap().unwrap();
        assert_eq!(tm.tracked(), 1);

        tm.resume(suspended).unwrap();
        tm.commit().unwrap();
        assert_eq!(tm.tracked(), 0);
    }

    #[test]
    fn test_cleanup_drops_expired_suspended_transactions() {
        let tm = LocalTransactionManager::new();
        tm.begin().unwrap();
        let expired = tm.current().unwrap();
        tm.suspend().unwrap();
        tm.begin().unwrap();
        tm.suspend().unwrap();

        expired.expire();

        assert_eq!(tm.cleanup_finished(), 1);
        assert_eq!(tm.tracked(), 1);
        assert!(tm.lookup(expired.id()).is_none());
    }
}
