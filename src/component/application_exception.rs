//! Application exception declarations.

use std::collections::HashMap;

use super::attribute::MethodId;
use crate::error::ErrorKind;

/// How a declared application exception affects the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplicationException {
    /// Mark the transaction rollback-only before delivering the error.
    pub rollback: bool,
}

impl ApplicationException {
    pub fn new(rollback: bool) -> Self {
        Self { rollback }
    }
}

/// The application exceptions a component declares, keyed by exact error kind.
///
/// A declaration can be scoped to one method; method-scoped entries win over
/// component-wide ones.
#[derive(Debug, Clone, Default)]
pub struct ApplicationExceptions {
    component_wide: HashMap<ErrorKind, ApplicationException>,
    per_method: HashMap<(MethodId, ErrorKind), ApplicationException>,
}

impl ApplicationExceptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, kind: impl Into<ErrorKind>, descriptor: ApplicationException) {
        self.component_wide.insert(kind.into(), descriptor);
    }

    pub fn declare_for_method(
        &mut self,
        method: impl Into<MethodId>,
        kind: impl Into<ErrorKind>,
        descriptor: ApplicationException,
    ) {
        self.per_method
            .insert((method.into(), kind.into()), descriptor);
    }

    pub fn lookup(&self, kind: &ErrorKind, method: &MethodId) -> Option<ApplicationException> {
        self.per_method
            .get(&(method.clone(), kind.clone()))
            .or_else(|| self.component_wide.get(kind))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.component_wide.len() + self.per_method.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_exact() {
        let mut declared = ApplicationExceptions::new();
        declared.declare("InsufficientFunds", ApplicationException::new(true));

        let method = MethodId::new("withdraw");
        assert_eq!(
            declared.lookup(&ErrorKind::new("InsufficientFunds"), &method),
            Some(ApplicationException { rollback: true })
        );
        assert_eq!(
            declared.lookup(&ErrorKind::new("InsufficientFundsV2"), &method),
            None
        );
    }

    #[test]
    fn test_method_scope_wins() {
        let mut declared = ApplicationExceptions::new();
        declared.declare("Rejected", ApplicationException::new(false));
        declared.declare_for_method("approve", "Rejected", ApplicationException::new(true));

        let kind = ErrorKind::new("Rejected");
        assert_eq!(
            declared.lookup(&kind, &MethodId::new("approve")).map(|d| d.rollback),
            Some(true)
        );
        assert_eq!(
            declared.lookup(&kind, &MethodId::new("list")).map(|d| d.rollback),
            Some(false)
        );
        assert_eq!(declared.len(), 2);
        assert!(!declared.is_empty());
        assert!(ApplicationExceptions::new().is_empty());
    }
}
