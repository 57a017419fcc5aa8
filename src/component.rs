//! Component metadata consumed by the interceptors.
//!
//! This module provides:
//! - The `Component` trait: attribute and application exception lookup
//! - Transaction attributes, method and interface identifiers
//! - Stateful instance state (instance lock, carried BMT transaction)
//! - `SimpleComponent`, a table-driven implementation

pub mod application_exception;
pub mod attribute;
pub mod simple;
pub mod stateful;

use std::sync::Arc;

pub use application_exception::{ApplicationException, ApplicationExceptions};
pub use attribute::{InterfaceKind, MethodId, MethodTransaction, TransactionAttribute};
pub use simple::{SimpleComponent, SimpleComponentBuilder};
pub use stateful::{LockOwner, StatefulInstance};

use crate::error::ErrorKind;
use crate::transaction::TransactionManager;

/// Kind of session component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Stateless,
    Stateful,
    Singleton,
    MessageDriven,
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stateless => "stateless",
            Self::Stateful => "stateful",
            Self::Singleton => "singleton",
            Self::MessageDriven => "message-driven",
        };
        f.write_str(name)
    }
}

/// A deployed component, as seen by its interceptors.
pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ComponentKind;

    /// Attribute and timeout override for `method` invoked through `interface`.
    fn transaction_attribute(&self, interface: InterfaceKind, method: &MethodId)
        -> MethodTransaction;

    /// Descriptor for an error of exactly `kind` raised from `method`, if declared.
    fn application_exception(
        &self,
        kind: &ErrorKind,
        method: &MethodId,
    ) -> Option<ApplicationException>;

    fn transaction_manager(&self) -> Arc<dyn TransactionManager>;
}
