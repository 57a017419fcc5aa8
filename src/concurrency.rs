//! Concurrency primitives.
//!
//! - Owner-keyed reentrant locking for stateful component instances

pub mod owner_lock;

pub use owner_lock::{LockError, OwnerLock, OwnerLockGuard};
