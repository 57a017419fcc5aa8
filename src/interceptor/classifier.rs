//! Classification of errors escaping a business method.
//!
//! Every error is mapped to a [`Disposition`] by one function. Declared
//! application exceptions are delivered exactly as raised; everything else
//! either passes through as an already-normalized container error or is
//! wrapped into one, and dooms the transaction it ran in.

use crate::component::{Component, MethodId};
use crate::error::{FaultClass, InvocationError};
use crate::transaction::TransactionHandle;

/// What happens to an error on its way out of a transactional boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Declared application exception.
    Application { rollback: bool },
    /// Already the rolled-back signal.
    RolledBack,
    /// Unrecoverable fault.
    Fatal,
    /// The target instance no longer exists.
    NoSuchInstance,
    /// Undeclared checked fault; part of the method contract.
    Checked,
    /// Ordinary runtime fault.
    Unchecked,
    /// Container error raised by an inner layer (deadlocks included).
    System,
}

impl Disposition {
    /// Whether the transaction the call ran in must be marked rollback-only.
    pub fn marks_rollback(&self) -> bool {
        match self {
            Self::Application { rollback } => *rollback,
            Self::Checked => false,
            Self::RolledBack
            | Self::Fatal
            | Self::NoSuchInstance
            | Self::Unchecked
            | Self::System => true,
        }
    }

    /// Whether the error is replaced by a wrapper.
    pub fn wraps(&self) -> bool {
        matches!(self, Self::Fatal | Self::Unchecked)
    }
}

/// Decides how `error` raised by `method` of `component` is treated.
pub fn classify(error: &InvocationError, component: &dyn Component, method: &MethodId) -> Disposition {
    match error {
        InvocationError::Business(fault) => {
            if fault.class != FaultClass::Fatal {
                if let Some(declared) = component.application_exception(&fault.kind, method) {
                    return Disposition::Application {
                        rollback: declared.rollback,
                    };
                }
            }
            match fault.class {
                FaultClass::Checked => Disposition::Checked,
                FaultClass::Unchecked => Disposition::Unchecked,
                FaultClass::Fatal => Disposition::Fatal,
            }
        }
        InvocationError::TransactionRolledBack { .. } => Disposition::RolledBack,
        InvocationError::NoSuchInstance(_) => Disposition::NoSuchInstance,
        _ => Disposition::System,
    }
}

/// Marks `tx` rollback-only, logging instead of failing.
pub fn set_rollback_only(tx: &TransactionHandle) {
    if let Err(e) = tx.set_rollback_only() {
        log::error!("Failed to set transaction {} for rollback only: {}", tx.id(), e);
    }
}

/// Applies the classification of `error`.
///
/// `tx` is the transaction the business method ran in, owned or joined; with
/// `None` nothing is marked. The returned error is what the caller receives.
pub fn handle_exception(
    error: InvocationError,
    component: &dyn Component,
    method: &MethodId,
    tx: Option<&TransactionHandle>,
) -> InvocationError {
    let disposition = classify(&error, component, method);
    log::debug!("{} raised {:?}: {}", method, disposition, error);

    if let Some(tx) = tx {
        if disposition.marks_rollback() {
            set_rollback_only(tx);
        }
    }

    match disposition {
        Disposition::Fatal if tx.is_some() => {
            InvocationError::rolled_back("Unexpected error", Some(error))
        }
        Disposition::Fatal => InvocationError::container("Unexpected error", Some(error)),
        Disposition::Unchecked => {
            let message = error.to_string();
            InvocationError::container(message, Some(error))
        }
        _ => error,
    }
}
