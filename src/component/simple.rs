//! Table-driven component.

use std::collections::HashMap;
use std::sync::Arc;

use super::application_exception::{ApplicationException, ApplicationExceptions};
use super::attribute::{InterfaceKind, MethodId, MethodTransaction, TransactionAttribute};
use super::{Component, ComponentKind};
use crate::error::ErrorKind;
use crate::transaction::TransactionManager;

/// Component whose metadata is a set of lookup tables.
///
/// Resolution order for a method's attribute: interface-specific entry,
/// then method entry, then the component default (`REQUIRED` unless set).
pub struct SimpleComponent {
    name: String,
    kind: ComponentKind,
    transaction_manager: Arc<dyn TransactionManager>,
    default: MethodTransaction,
    methods: HashMap<MethodId, MethodTransaction>,
    interface_methods: HashMap<(InterfaceKind, MethodId), MethodTransaction>,
    exceptions: ApplicationExceptions,
}

impl SimpleComponent {
    pub fn builder(
        name: impl Into<String>,
        kind: ComponentKind,
        transaction_manager: Arc<dyn TransactionManager>,
    ) -> SimpleComponentBuilder {
        SimpleComponentBuilder {
            component: SimpleComponent {
                name: name.into(),
                kind,
                transaction_manager,
                default: MethodTransaction::default(),
                methods: HashMap::new(),
                interface_methods: HashMap::new(),
                exceptions: ApplicationExceptions::new(),
            },
        }
    }
}

impl Component for SimpleComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        self.kind
    }

    fn transaction_attribute(
        &self,
        interface: InterfaceKind,
        method: &MethodId,
    ) -> MethodTransaction {
        self.interface_methods
            .get(&(interface, method.clone()))
            .or_else(|| self.methods.get(method))
            .copied()
            .unwrap_or(self.default)
    }

    fn application_exception(
        &self,
        kind: &ErrorKind,
        method: &MethodId,
    ) -> Option<ApplicationException> {
        self.exceptions.lookup(kind, method)
    }

    fn transaction_manager(&self) -> Arc<dyn TransactionManager> {
        Arc::clone(&self.transaction_manager)
    }
}

pub struct SimpleComponentBuilder {
    component: SimpleComponent,
}

impl SimpleComponentBuilder {
    pub fn default_attribute(mut self, attribute: TransactionAttribute) -> Self {
        self.component.default = MethodTransaction::new(attribute);
        self
    }

    pub fn method(mut self, method: impl Into<MethodId>, resolved: MethodTransaction) -> Self {
        self.component.methods.insert(method.into(), resolved);
        self
    }

    pub fn method_attribute(
        self,
        method: impl Into<MethodId>,
        attribute: TransactionAttribute,
    ) -> Self {
        self.method(method, MethodTransaction::new(attribute))
    }

    pub fn interface_method(
        mut self,
        interface: InterfaceKind,
        method: impl Into<MethodId>,
        resolved: MethodTransaction,
    ) -> Self {
        self.component
            .interface_methods
            .insert((interface, method.into()), resolved);
        self
    }

    pub fn application_exception(mut self, kind: impl Into<ErrorKind>, rollback: bool) -> Self {
        self.component
            .exceptions
            .declare(kind, ApplicationException::new(rollback));
        self
    }

    pub fn build(self) -> SimpleComponent {
        self.component
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::LocalTransactionManager;

    fn component() -> SimpleComponent {
        SimpleComponent::builder(
            "AccountBean",
            ComponentKind::Stateless,
            Arc::new(LocalTransactionManager::new()),
        )
        .method_attribute("balance", TransactionAttribute::Supports)
        .interface_method(
            InterfaceKind::Remote,
            "balance",
            MethodTransaction::new(TransactionAttribute::NotSupported).with_timeout(5),
        )
        .application_exception("InsufficientFunds", true)
        .build()
    }

    #[test]
    fn test_attribute_resolution_order() {
        let c = component();
        let balance = MethodId::new("balance");

        assert_eq!(
            c.transaction_attribute(InterfaceKind::Remote, &balance),
            MethodTransaction::new(TransactionAttribute::NotSupported).with_timeout(5)
        );
        assert_eq!(
            c.transaction_attribute(InterfaceKind::Local, &balance).attribute,
            TransactionAttribute::Supports
        );
        assert_eq!(
            c.transaction_attribute(InterfaceKind::Local, &MethodId::new("withdraw"))
                .attribute,
            TransactionAttribute::Required
        );
    }

    #[test]
    fn test_application_exception_lookup() {
        let c = component();
        let method = MethodId::new("withdraw");
        assert_eq!(
            c.application_exception(&ErrorKind::new("InsufficientFunds"), &method),
            Some(ApplicationException::new(true))
        );
        assert_eq!(
            c.application_exception(&ErrorKind::new("IllegalState"), &method),
            None
        );
        assert_eq!(c.name(), "AccountBean");
        assert_eq!(c.kind(), ComponentKind::Stateless);
    }
}
