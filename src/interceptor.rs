//! Transaction interceptors.
//!
//! This module provides:
//! - `CmtInterceptor`: container-managed attribute enforcement with deadlock retry
//! - Timer and lifecycle variants with a fixed attribute
//! - Bean-managed transaction bracket checks
//! - Stateful instance locking
//! - Error classification shared by all of them

pub mod backoff;
pub mod bmt;
pub mod classifier;
pub mod cmt;
pub mod guard;
pub mod instance_lock;
pub mod lifecycle;
pub mod timer;

pub use backoff::{Backoff, NoBackoff, RandomBackoff};
pub use bmt::{StatefulBmtInterceptor, StatelessBmtInterceptor};
pub use classifier::{classify, handle_exception, Disposition};
pub use cmt::{plan, Action, CmtInterceptor};
pub use guard::{SuspendGuard, TimeoutGuard};
pub use instance_lock::InstanceLockInterceptor;
pub use lifecycle::{lifecycle_attribute, LifecycleInterceptor};
pub use timer::TimerInterceptor;
