//! Bracket checks for bean-managed transactions.
//!
//! A BMT bean begins and ends its own transactions. The container never lets
//! the caller's transaction leak into the bean, and verifies after every call
//! that the bean did not leave a transaction half finished.

use super::guard::SuspendGuard;
use crate::component::StatefulInstance;
use crate::error::{InvocationError, Result};
use crate::invocation::{Interceptor, Invocation};
use crate::transaction::{Status, TransactionManager};

fn not_complete(component: &str, cause: Option<InvocationError>) -> InvocationError {
    InvocationError::TransactionNotComplete {
        component: component.to_string(),
        cause: cause.map(Box::new),
    }
}

/// Rolls back whatever the bean left on the thread. Failures are logged; the
/// association is dropped either way.
fn roll_back_leftover(tm: &dyn TransactionManager, component: &str, status: Status) {
    log::error!(
        "BMT bean {} should complete transaction before returning (status {})",
        component,
        status
    );
    if let Err(e) = tm.rollback() {
        log::error!("failed to roll back transaction left by {}: {}", component, e);
        discard_leftover(tm, component);
    }
}

fn discard_leftover(tm: &dyn TransactionManager, component: &str) {
    match tm.suspend() {
        Ok(Some(tx)) => log::debug!("discarded {} left by {}", tx.id(), component),
        Ok(None) => {}
        Err(e) => log::error!("failed to disassociate transaction left by {}: {}", component, e),
    }
}

/// BMT checks for stateless and singleton components.
///
/// Any transaction the bean leaves open is an error: it is rolled back and
/// the call fails with `TransactionNotComplete`, carrying the business error
/// as its cause when the call had failed anyway.
#[derive(Debug, Default)]
pub struct StatelessBmtInterceptor;

impl StatelessBmtInterceptor {
    pub fn new() -> Self {
        Self
    }
}

impl<T> Interceptor<T> for StatelessBmtInterceptor {
    fn process(&self, invocation: &mut Invocation<'_, T>) -> Result<T> {
        let component = invocation.component()?;
        let tm = component.transaction_manager();
        let _caller = SuspendGuard::suspend(tm.as_ref())?;

        let outcome = invocation.proceed();

        let status = match tm.status() {
            Ok(status) => status,
            Err(e) => {
                discard_leftover(tm.as_ref(), component.name());
                return Err(e.into());
            }
        };
        match status {
            Status::Active
            | Status::Committing
            | Status::MarkedRollback
            | Status::Preparing
            | Status::RollingBack => {
                roll_back_leftover(tm.as_ref(), component.name(), status);
                Err(not_complete(component.name(), outcome.err()))
            }
            Status::Prepared => {
                log::error!(
                    "BMT bean {} should complete transaction before returning (status {})",
                    component.name(),
                    status
                );
                discard_leftover(tm.as_ref(), component.name());
                Err(not_complete(component.name(), outcome.err()))
            }
            _ => {
                discard_leftover(tm.as_ref(), component.name());
                outcome
            }
        }
    }
}

/// BMT checks for stateful components.
///
/// A transaction the bean leaves active belongs to the instance: it is
/// suspended at the end of the call and resumed at the start of the next call
/// to the same instance. Only a transaction stuck between states is an error.
#[derive(Debug, Default)]
pub struct StatefulBmtInterceptor;

impl StatefulBmtInterceptor {
    pub fn new() -> Self {
        Self
    }
}

impl<T> Interceptor<T> for StatefulBmtInterceptor {
    fn process(&self, invocation: &mut Invocation<'_, T>) -> Result<T> {
        let component = invocation.component()?;
        let instance = invocation
            .private_data::<StatefulInstance>()
            .ok_or(InvocationError::MissingPrivateData("stateful instance"))?;
        let tm = component.transaction_manager();
        let _caller = SuspendGuard::suspend(tm.as_ref())?;

        if let Some(tx) = instance.take_transaction() {
            log::debug!("resuming {} for instance {}", tx.id(), instance.id());
            if let Err(e) = tm.resume(tx.clone()) {
                instance.remember_transaction(Some(tx));
                return Err(e.into());
            }
        }

        let outcome = invocation.proceed();

        let status = match tm.status() {
            Ok(status) => status,
            Err(e) => {
                // The instance keeps whatever the bean left; the next call resumes it.
                instance.remember_transaction(tm.suspend()?);
                return Err(e.into());
            }
        };
        match status {
            Status::Committing | Status::MarkedRollback | Status::Preparing | Status::RollingBack => {
                roll_back_leftover(tm.as_ref(), component.name(), status);
                instance.remember_transaction(None);
                Err(not_complete(component.name(), outcome.err()))
            }
            _ => {
                let leftover = tm.suspend()?;
                if let Some(tx) = &leftover {
                    log::debug!("instance {} keeps {} across calls", instance.id(), tx.id());
                }
                instance.remember_transaction(leftover);
                outcome
            }
        }
    }
}
