//! Errors that cross an interceptor boundary.
//!
//! Business code reports failures as a [`Fault`]. Everything an interceptor
//! returns is an [`InvocationError`]: either the fault itself, delivered
//! untouched, or one of a small fixed family of container errors that callers
//! can match on.

use std::time::Duration;

use thiserror::Error;

use crate::component::MethodId;
use crate::concurrency::owner_lock::LockError;
use crate::transaction::{Status, TransactionError, TransactionId};

/// Name of a business error type. Application exception descriptors are keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorKind(String);

impl ErrorKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ErrorKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// How severe a business fault is when it is not a declared application exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultClass {
    /// Part of the method's declared contract; delivered as-is.
    Checked,
    /// Ordinary runtime failure.
    Unchecked,
    /// Unrecoverable failure (the equivalent of an `Error`, never an application exception).
    Fatal,
}

/// A failure raised by business logic.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct Fault {
    pub kind: ErrorKind,
    pub message: String,
    pub class: FaultClass,
}

impl Fault {
    pub fn new(kind: impl Into<ErrorKind>, message: impl Into<String>, class: FaultClass) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            class,
        }
    }

    pub fn checked(kind: impl Into<ErrorKind>, message: impl Into<String>) -> Self {
        Self::new(kind, message, FaultClass::Checked)
    }

    pub fn unchecked(kind: impl Into<ErrorKind>, message: impl Into<String>) -> Self {
        Self::new(kind, message, FaultClass::Unchecked)
    }

    pub fn fatal(kind: impl Into<ErrorKind>, message: impl Into<String>) -> Self {
        Self::new(kind, message, FaultClass::Fatal)
    }
}

impl From<Fault> for InvocationError {
    fn from(fault: Fault) -> Self {
        InvocationError::Business(fault)
    }
}

fn describe_tx(tx: &Option<TransactionId>) -> String {
    tx.map(|id| id.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Errors returned from an intercepted invocation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvocationError {
    #[error(transparent)]
    Business(Fault),

    /// The target component instance no longer exists.
    #[error("No such instance: {0}")]
    NoSuchInstance(String),

    #[error("Transaction is required for invocation {method}")]
    TransactionRequired { method: MethodId },

    #[error("Transaction present on server in Never call ({method})")]
    TransactionNotAllowed { method: MethodId },

    /// The transaction the call ran in has been, or will be, rolled back.
    #[error("{message}")]
    TransactionRolledBack {
        message: String,
        #[source]
        cause: Option<Box<InvocationError>>,
    },

    /// Generic container failure wrapping a system-level cause.
    #[error("{message}")]
    Container {
        message: String,
        #[source]
        cause: Option<Box<InvocationError>>,
    },

    #[error("Transaction '{tx}' is in unexpected state ({status})")]
    UnexpectedState { tx: TransactionId, status: Status },

    #[error("Wrong tx on thread: expected {expected}, actual {}", describe_tx(.actual))]
    WrongTransaction {
        expected: TransactionId,
        actual: Option<TransactionId>,
    },

    #[error("BMT bean {component} should complete transaction before returning")]
    TransactionNotComplete {
        component: String,
        #[source]
        cause: Option<Box<InvocationError>>,
    },

    #[error("Timer invocation failed, transaction rolled back")]
    TimerRolledBack,

    #[error("Deadlock detected: {message}")]
    Deadlock { message: String, retryable: bool },

    #[error("Concurrent access timeout on {component}: could not obtain lock within {timeout:?}")]
    ConcurrentAccessTimeout { component: String, timeout: Duration },

    #[error("Invocation carries no {0}")]
    MissingPrivateData(&'static str),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

impl InvocationError {
    pub fn rolled_back(message: impl Into<String>, cause: Option<InvocationError>) -> Self {
        Self::TransactionRolledBack {
            message: message.into(),
            cause: cause.map(Box::new),
        }
    }

    pub fn container(message: impl Into<String>, cause: Option<InvocationError>) -> Self {
        Self::Container {
            message: message.into(),
            cause: cause.map(Box::new),
        }
    }

    pub fn deadlock(message: impl Into<String>) -> Self {
        Self::Deadlock {
            message: message.into(),
            retryable: true,
        }
    }

    /// The business fault, if this error is one.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Business(fault) => Some(fault),
            _ => None,
        }
    }

    /// The wrapped cause, for the wrapper kinds.
    pub fn cause(&self) -> Option<&InvocationError> {
        match self {
            Self::TransactionRolledBack { cause, .. }
            | Self::Container { cause, .. }
            | Self::TransactionNotComplete { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }

    /// Returns true for the errors that tell a caller its transaction was rolled back.
    pub fn is_rolled_back(&self) -> bool {
        matches!(self, Self::TransactionRolledBack { .. } | Self::TimerRolledBack)
    }
}

/// Result type for intercepted invocations.
pub type Result<T> = std::result::Result<T, InvocationError>;
