//! Contracts for the transaction manager the interceptors drive.
//!
//! The interceptors never create transactions themselves. They ask a
//! [`TransactionManager`] to begin, end, suspend and resume the transaction
//! associated with the calling context, and inspect individual transactions
//! through [`Transaction`] handles.

use std::fmt::Debug;
use std::sync::Arc;

use thiserror::Error;

use super::id::TransactionId;
use super::status::Status;
use crate::error::InvocationError;

/// Failures reported by a transaction manager.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    #[error("No transaction is associated with the calling context")]
    NoTransaction,

    #[error("Transaction {id} is not active ({status})")]
    NotActive { id: TransactionId, status: Status },

    /// Commit was turned into a rollback.
    #[error("Transaction {id} rolled back: {reason}")]
    RolledBack { id: TransactionId, reason: String },

    #[error("Transaction {0} completed with a heuristic mixed outcome")]
    HeuristicMixed(TransactionId),

    #[error("Calling context is already associated with transaction {0}")]
    AlreadyAssociated(TransactionId),

    #[error("Transaction {0} is not known to this manager")]
    Unknown(TransactionId),

    #[error("Transaction system error: {0}")]
    System(String),
}

impl TransactionError {
    /// Returns true if this failure means the transaction ended in rollback.
    pub fn is_rollback(&self) -> bool {
        matches!(self, Self::RolledBack { .. })
    }
}

pub type Result<T> = std::result::Result<T, TransactionError>;

/// A single transaction.
pub trait Transaction: Send + Sync + Debug {
    fn id(&self) -> TransactionId;

    fn status(&self) -> Result<Status>;

    /// Dooms the transaction. Irreversible.
    fn set_rollback_only(&self) -> Result<()>;
}

/// Shared handle to a transaction.
pub type TransactionHandle = Arc<dyn Transaction>;

/// Returns true if both handles denote the same transaction.
pub fn same_transaction(a: &TransactionHandle, b: &TransactionHandle) -> bool {
    a.id() == b.id()
}

/// Transaction manager bound to an execution context.
///
/// Every operation acts on the transaction associated with the calling
/// context. At most one transaction is associated at a time; `suspend` and
/// `resume` move the association in and out.
pub trait TransactionManager: Send + Sync {
    /// Starts a transaction and associates it with the calling context.
    fn begin(&self) -> Result<()>;

    /// Commits the associated transaction and clears the association.
    fn commit(&self) -> Result<()>;

    /// Rolls back the associated transaction and clears the association.
    fn rollback(&self) -> Result<()>;

    fn transaction(&self) -> Result<Option<TransactionHandle>>;

    fn suspend(&self) -> Result<Option<TransactionHandle>>;

    fn resume(&self, tx: TransactionHandle) -> Result<()>;

    /// Status of the associated transaction, `NoTransaction` when there is none.
    fn status(&self) -> Result<Status>;

    /// Timeout in seconds for transactions begun afterwards; 0 restores the default.
    fn set_transaction_timeout(&self, seconds: u32) -> Result<()>;

    fn transaction_timeout(&self) -> u32;

    /// Decides whether `error` is a deadlock signal worth retrying.
    ///
    /// Integrations with their own deadlock detection override this; the
    /// default trusts the flag carried by [`InvocationError::Deadlock`].
    fn is_retryable_deadlock(&self, error: &InvocationError) -> bool {
        matches!(error, InvocationError::Deadlock { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_error_display() {
        let err = TransactionError::NotActive {
            id: TransactionId::new(3),
            status: Status::Committed,
        };
        assert_eq!(
            err.to_string(),
            "Transaction tx-3 is not active (STATUS_COMMITTED)"
        );
    }

    #[test]
    fn test_only_rolled_back_is_rollback() {
        let rolled_back = TransactionError::RolledBack {
            id: TransactionId::new(1),
            reason: "marked rollback-only".to_string(),
        };
        assert!(rolled_back.is_rollback());
        assert!(!TransactionError::HeuristicMixed(TransactionId::new(1)).is_rollback());
        assert!(!TransactionError::System("disk".to_string()).is_rollback());
    }
}
