//! Reentrant mutual exclusion keyed by an owner token.
//!
//! Unlike a thread mutex, reentrancy is decided by comparing the stored owner
//! with the requesting one, so a transaction that hops between worker threads
//! keeps holding the lock.

use std::fmt::Debug;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Errors raised by [`OwnerLock`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LockError {
    /// Release attempted by someone other than the holder.
    #[error("Lock released by {owner} but held by {holder}")]
    IllegalState { owner: String, holder: String },

    /// The wait was abandoned because the lock's internal state was poisoned.
    #[error("Failed to acquire lock for {0}")]
    Interrupted(String),
}

#[derive(Debug)]
struct LockState<O> {
    owner: Option<O>,
    count: usize,
    waiters: usize,
}

impl<O: PartialEq + Clone> LockState<O> {
    /// Takes or re-enters the lock if `owner` may hold it.
    fn try_take(&mut self, owner: &O) -> bool {
        match &self.owner {
            None => {
                self.owner = Some(owner.clone());
                self.count = 1;
                true
            }
            Some(current) if current == owner => {
                self.count += 1;
                true
            }
            Some(_) => false,
        }
    }
}

/// Owner-keyed reentrant lock.
#[derive(Debug)]
pub struct OwnerLock<O> {
    state: Mutex<LockState<O>>,
    released: Condvar,
}

impl<O: PartialEq + Clone + Debug> OwnerLock<O> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                owner: None,
                count: 0,
                waiters: 0,
            }),
            released: Condvar::new(),
        }
    }

    fn interrupted<T>(owner: &O) -> impl FnOnce(PoisonError<T>) -> LockError + '_ {
        move |_| LockError::Interrupted(format!("{:?}", owner))
    }

    fn state(&self, owner: &O) -> Result<MutexGuard<'_, LockState<O>>, LockError> {
        self.state.lock().map_err(Self::interrupted(owner))
    }

    /// Blocks until `owner` holds the lock.
    pub fn acquire(&self, owner: &O) -> Result<(), LockError> {
        let mut state = self.state(owner)?;
        while !state.try_take(owner) {
            state.waiters += 1;
            state = self
                .released
                .wait(state)
                .map_err(Self::interrupted(owner))?;
            state.waiters -= 1;
        }
        Ok(())
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    ///
    /// Returns `Ok(false)` if the lock could not be obtained in time.
    pub fn try_acquire(&self, owner: &O, timeout: Duration) -> Result<bool, LockError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state(owner)?;
        loop {
            if state.try_take(owner) {
                return Ok(true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            state.waiters += 1;
            let (next, _) = self
                .released
                .wait_timeout(state, remaining)
                .map_err(Self::interrupted(owner))?;
            state = next;
            state.waiters -= 1;
        }
    }

    /// Drops one level of ownership. The lock is freed when the count hits zero.
    pub fn release(&self, owner: &O) -> Result<(), LockError> {
        let mut state = self.state(owner)?;
        match &state.owner {
            Some(current) if current == owner => {}
            current => {
                return Err(LockError::IllegalState {
                    owner: format!("{:?}", owner),
                    holder: current
                        .as_ref()
                        .map(|h| format!("{:?}", h))
                        .unwrap_or_else(|| "nobody".to_string()),
                })
            }
        }

        state.count -= 1;
        if state.count == 0 {
            state.owner = None;
            if state.waiters > 0 {
                self.released.notify_one();
            }
        }
        Ok(())
    }

    /// Acquires and returns a guard that releases on drop.
    pub fn lock<'a>(&'a self, owner: &O) -> Result<OwnerLockGuard<'a, O>, LockError> {
        self.acquire(owner)?;
        Ok(OwnerLockGuard {
            lock: self,
            owner: owner.clone(),
        })
    }

    /// Timed variant of [`lock`](Self::lock). `None` if the timeout elapsed.
    pub fn try_lock<'a>(
        &'a self,
        owner: &O,
        timeout: Duration,
    ) -> Result<Option<OwnerLockGuard<'a, O>>, LockError> {
        Ok(self
            .try_acquire(owner, timeout)?
            .then(|| OwnerLockGuard {
                lock: self,
                owner: owner.clone(),
            }))
    }

    pub fn owner(&self) -> Option<O> {
        self.state.lock().ok().and_then(|s| s.owner.clone())
    }

    pub fn hold_count(&self) -> usize {
        self.state.lock().map(|s| s.count).unwrap_or(0)
    }

    /// Number of acquisitions currently blocked on this lock.
    pub fn waiters(&self) -> usize {
        self.state.lock().map(|s| s.waiters).unwrap_or(0)
    }

    pub fn is_locked(&self) -> bool {
        self.hold_count() > 0
    }
}

impl<O: PartialEq + Clone + Debug> Default for OwnerLock<O> {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds one level of an [`OwnerLock`] until dropped.
pub struct OwnerLockGuard<'a, O: PartialEq + Clone + Debug> {
    lock: &'a OwnerLock<O>,
    owner: O,
}

impl<O: PartialEq + Clone + Debug> OwnerLockGuard<'_, O> {
    pub fn owner(&self) -> &O {
        &self.owner
    }
}

impl<O: PartialEq + Clone + Debug> Drop for OwnerLockGuard<'_, O> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release(&self.owner) {
            log::error!("failed to release instance lock: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_reentrant_acquire() {
        let lock = OwnerLock::new();

        lock.acquire(&"A").unwrap();
        lock.acquire(&"A").unwrap();

        assert_eq!(lock.owner(), Some("A"));
        assert_eq!(lock.hold_count(), 2);
    }

    #[test]
    fn test_release_to_zero_frees_lock() {
        let lock = OwnerLock::new();
        lock.acquire(&"A").unwrap();
        lock.acquire(&"A").unwrap();

        lock.release(&"A").unwrap();
        assert!(lock.is_locked());
        lock.release(&"A").unwrap();
        assert!(!lock.is_locked());
        assert_eq!(lock.owner(), None);

        lock.acquire(&"B").unwrap();
        assert_eq!(lock.owner(), Some("B"));
    }

    #[test]
    fn test_release_by_wrong_owner() {
        let lock = OwnerLock::new();
        lock.acquire(&"A").unwrap();

        let err = lock.release(&"B").unwrap_err();
        assert!(matches!(err, LockError::IllegalState { .. }));
        // The holder is unaffected.
        assert_eq!(lock.owner(), Some("A"));
        assert_eq!(lock.hold_count(), 1);
    }

    #[test]
    fn test_release_unheld_lock() {
        let lock: OwnerLock<u32> = OwnerLock::new();
        assert_eq!(
            lock.release(&1),
            Err(LockError::IllegalState {
                owner: "1".to_string(),
                holder: "nobody".to_string(),
            })
        );
    }

    #[test]
    fn test_try_acquire_times_out() {
        let lock = Arc::new(OwnerLock::new());
        lock.acquire(&1u64).unwrap();

        let contender = Arc::clone(&lock);
        let started = Instant::now();
        let acquired = thread::spawn(move || {
            contender
                .try_acquire(&2u64, Duration::from_millis(50))
                .unwrap()
        })
        .join()
        .unwrap();

        assert!(!acquired);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(lock.owner(), Some(1));
        assert_eq!(lock.waiters(), 0);
    }

    #[test]
    fn test_try_acquire_succeeds_when_free() {
        let lock = OwnerLock::new();
        assert!(lock.try_acquire(&"A", Duration::ZERO).unwrap());
        assert!(lock.try_acquire(&"A", Duration::ZERO).unwrap());
        assert!(!lock.try_acquire(&"B", Duration::ZERO).unwrap());
    }

    #[test]
    fn test_blocked_acquire_wakes_on_release() {
        let lock = Arc::new(OwnerLock::new());
        let barrier = Arc::new(Barrier::new(2));
        lock.acquire(&"A").unwrap();

        let contender = Arc::clone(&lock);
        let barrier_clone = Arc::clone(&barrier);
        let handle = thread::spawn(move || {
            barrier_clone.wait();
            let started = Instant::now();
            contender.acquire(&"B").unwrap();
            let waited = started.elapsed();
            contender.release(&"B").unwrap();
            waited
        });

        barrier.wait();
        // Give the contender time to block.
        while lock.waiters() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        let released_at = Instant::now();
        lock.release(&"A").unwrap();

        let waited = handle.join().unwrap();
        assert!(waited < Duration::from_secs(2));
        assert!(released_at.elapsed() < Duration::from_secs(2));
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_mutual_exclusion_between_owners() {
        let lock = Arc::new(OwnerLock::new());
        let inside = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let handles: Vec<_> = (0..4u32)
            .map(|owner| {
                let lock = Arc::clone(&lock);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    for _ in 0..20 {
                        let _guard = lock.lock(&owner).unwrap();
                        let now = inside.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        assert_eq!(now, 0);
                        thread::sleep(Duration::from_micros(100));
                        inside.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_owner_moves_across_threads() {
        let lock = Arc::new(OwnerLock::new());
        lock.acquire(&"tx-1").unwrap();

        // Same owner on another thread re-enters instead of blocking.
        let other = Arc::clone(&lock);
        thread::spawn(move || {
            other.acquire(&"tx-1").unwrap();
            other.release(&"tx-1").unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(lock.hold_count(), 1);
        lock.release(&"tx-1").unwrap();
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let lock = OwnerLock::new();
        {
            let guard = lock.lock(&7).unwrap();
            assert_eq!(*guard.owner(), 7);
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());

        assert!(lock.try_lock(&8, Duration::ZERO).unwrap().is_some());
        assert!(!lock.is_locked());
    }
}
