//! Transaction contracts consumed by the interceptors.
//!
//! This module provides:
//! - Transaction identity and status values
//! - The `TransactionManager` / `Transaction` traits the interceptors drive
//! - An in-process, thread-associated manager for simulation and tests

pub mod id;
pub mod local;
pub mod manager;
pub mod status;
#[cfg(test)]
pub(crate) mod testing;

pub use id::{TransactionId, TransactionIdGenerator};
pub use local::{LocalTransaction, LocalTransactionManager, TransactionStats};
pub use manager::{
    same_transaction, Transaction, TransactionError, TransactionHandle, TransactionManager,
};
pub use status::Status;
