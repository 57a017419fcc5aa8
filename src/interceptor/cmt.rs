//! Container-managed transaction demarcation.
//!
//! For each invocation the interceptor resolves the method's transaction
//! attribute, looks at the transaction associated with the caller and picks an
//! [`Action`]: join the caller's transaction, run without one, or run in a
//! transaction of its own. Own transactions are always ended before the
//! interceptor returns, and are retried from `begin` when the call fails with
//! a retryable deadlock.

use std::sync::Arc;
use std::thread;

use super::backoff::{Backoff, RandomBackoff};
use super::classifier::handle_exception;
use super::guard::{SuspendGuard, TimeoutGuard};
use crate::component::{Component, MethodTransaction, TransactionAttribute};
use crate::config::InterceptorConfig;
use crate::error::{InvocationError, Result};
use crate::invocation::{Interceptor, Invocation};
use crate::transaction::{
    same_transaction, Status, TransactionError, TransactionHandle, TransactionManager,
};

/// What to do with an invocation, given its attribute and the caller's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Refuse: a transaction is required and the caller has none.
    FailRequired,
    /// Refuse: the caller has a transaction and none is allowed.
    FailNotAllowed,
    /// Run in the caller's transaction; failures mark it but never end it.
    InCallerTransaction,
    /// Run with no transaction; the caller has none either.
    NoTransaction,
    /// Suspend the caller's transaction, run with none, resume it afterwards.
    SuspendThenNoTransaction,
    /// Begin, run and end a transaction of our own.
    OwnTransaction,
    /// Suspend the caller's transaction around an [`Action::OwnTransaction`].
    SuspendThenOwnTransaction,
}

/// The attribute dispatch table.
pub fn plan(attribute: TransactionAttribute, caller_has_transaction: bool) -> Action {
    use TransactionAttribute::*;

    match (attribute, caller_has_transaction) {
        (Mandatory, false) => Action::FailRequired,
        (Mandatory, true) => Action::InCallerTransaction,
        (Never, true) => Action::FailNotAllowed,
        (Never, false) => Action::NoTransaction,
        (NotSupported, true) => Action::SuspendThenNoTransaction,
        (NotSupported, false) => Action::NoTransaction,
        (Required, true) => Action::InCallerTransaction,
        (Required, false) => Action::OwnTransaction,
        (RequiresNew, true) => Action::SuspendThenOwnTransaction,
        (RequiresNew, false) => Action::OwnTransaction,
        (Supports, true) => Action::InCallerTransaction,
        (Supports, false) => Action::NoTransaction,
    }
}

/// Turns a failure to end a transaction into an invocation error.
fn end_failure(e: TransactionError) -> InvocationError {
    let message = e.to_string();
    if e.is_rollback() {
        InvocationError::rolled_back(message, Some(InvocationError::Transaction(e)))
    } else {
        InvocationError::container(message, Some(InvocationError::Transaction(e)))
    }
}

#[derive(Debug, Clone, Copy)]
enum AttributeSource {
    PerInvocation,
    Fixed(TransactionAttribute),
}

/// Interceptor enforcing container-managed transaction attributes.
pub struct CmtInterceptor {
    source: AttributeSource,
    /// Report a rollback-only own transaction as `TimerRolledBack`.
    timer: bool,
    config: InterceptorConfig,
    backoff: Arc<dyn Backoff>,
}

impl CmtInterceptor {
    /// Interceptor that resolves the attribute from the component on every call.
    pub fn new(config: InterceptorConfig) -> Self {
        let backoff = Arc::new(RandomBackoff::new(&config));
        Self {
            source: AttributeSource::PerInvocation,
            timer: false,
            config,
            backoff,
        }
    }

    /// Interceptor that applies `attribute` regardless of method metadata.
    pub fn with_fixed_attribute(attribute: TransactionAttribute, config: InterceptorConfig) -> Self {
        Self {
            source: AttributeSource::Fixed(attribute),
            ..Self::new(config)
        }
    }

    pub(crate) fn signal_timer_rollback(mut self) -> Self {
        self.timer = true;
        self
    }

    /// Replaces the deadlock retry backoff.
    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    fn resolve<T>(&self, component: &dyn Component, invocation: &Invocation<'_, T>) -> MethodTransaction {
        let resolved = component.transaction_attribute(invocation.interface(), invocation.method());
        match self.source {
            AttributeSource::PerInvocation => resolved,
            AttributeSource::Fixed(attribute) => MethodTransaction {
                attribute,
                timeout: resolved.timeout,
            },
        }
    }

    fn invoke_in_caller_tx<T>(
        &self,
        invocation: &mut Invocation<'_, T>,
        component: &dyn Component,
        tx: &TransactionHandle,
    ) -> Result<T> {
        let method = invocation.method().clone();
        invocation
            .proceed()
            .map_err(|e| handle_exception(e, component, &method, Some(tx)))
    }

    fn invoke_in_no_tx<T>(
        &self,
        invocation: &mut Invocation<'_, T>,
        component: &dyn Component,
    ) -> Result<T> {
        let method = invocation.method().clone();
        invocation
            .proceed()
            .map_err(|e| handle_exception(e, component, &method, None))
    }

    fn begin(&self, tm: &dyn TransactionManager) -> Result<TransactionHandle> {
        tm.begin()?;
        match tm.transaction() {
            Ok(Some(tx)) => Ok(tx),
            other => {
                if let Err(e) = tm.rollback() {
                    log::error!("failed to roll back unusable transaction: {}", e);
                }
                Err(other.err().unwrap_or(TransactionError::NoTransaction).into())
            }
        }
    }

    fn invoke_in_our_tx<T>(
        &self,
        invocation: &mut Invocation<'_, T>,
        component: &dyn Component,
        tm: &dyn TransactionManager,
        timeout: &TimeoutGuard<'_>,
        seconds: Option<u32>,
    ) -> Result<T> {
        let attempts = self.config.attempts();
        let method = invocation.method().clone();
        let mut attempt = 0;
        loop {
            timeout.apply(seconds)?;
            let tx = self.begin(tm)?;
            log::debug!("{} began {} (attempt {})", method, tx.id(), attempt + 1);

            let outcome = invocation
                .proceed()
                .map_err(|e| handle_exception(e, component, &method, Some(&tx)));
            let outcome = match self.end_transaction(tm, &tx) {
                Ok(()) => outcome,
                Err(end_error) => {
                    if let Err(e) = &outcome {
                        log::debug!("{} failure superseded by end of {}: {}", method, tx.id(), e);
                    }
                    Err(end_error)
                }
            };

            match outcome {
                Err(e) if attempt + 1 < attempts && tm.is_retryable_deadlock(&e) => {
                    let delay = self.backoff.delay(attempt);
                    log::debug!(
                        "{} deadlocked in {}, retrying in {:?}: {}",
                        method,
                        tx.id(),
                        delay,
                        e
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    /// Ends `tx`, which must be the transaction associated with the caller.
    fn end_transaction(&self, tm: &dyn TransactionManager, tx: &TransactionHandle) -> Result<()> {
        let current = tm.transaction().map_err(end_failure)?;
        if !matches!(&current, Some(c) if same_transaction(c, tx)) {
            return Err(InvocationError::WrongTransaction {
                expected: tx.id(),
                actual: current.map(|c| c.id()),
            });
        }

        let status = tx.status().map_err(end_failure)?;
        log::debug!("ending {} ({})", tx.id(), status);
        let ended = match status {
            Status::Active => tm.commit().map_err(end_failure),
            Status::MarkedRollback => tm.rollback().map_err(end_failure),
            Status::RolledBack => {
                // Rolled back underneath us, e.g. by the timeout reaper; the
                // rollback only clears the association.
                tm.rollback().map_err(end_failure)?;
                Err(InvocationError::rolled_back(
                    format!("Transaction '{}' was already rolled back", tx.id()),
                    None,
                ))
            }
            Status::Unknown => {
                tm.rollback().map_err(end_failure)?;
                Err(InvocationError::UnexpectedState { tx: tx.id(), status })
            }
            _ => {
                tm.suspend().map_err(end_failure)?;
                Err(InvocationError::UnexpectedState { tx: tx.id(), status })
            }
        };

        if self.timer && ended.is_ok() && status.is_marked_rollback() {
            return Err(InvocationError::TimerRolledBack);
        }
        ended
    }
}

impl<T> Interceptor<T> for CmtInterceptor {
    fn process(&self, invocation: &mut Invocation<'_, T>) -> Result<T> {
        let component = invocation.component()?;
        let tm = component.transaction_manager();
        let timeout = TimeoutGuard::new(tm.as_ref());

        let resolved = self.resolve(component.as_ref(), invocation);
        let caller = tm.transaction()?;
        let action = plan(resolved.attribute, caller.is_some());
        log::debug!(
            "{} {} with caller transaction {:?}: {:?}",
            invocation.method(),
            resolved.attribute,
            caller.as_ref().map(|tx| tx.id()),
            action
        );

        match (action, caller) {
            (Action::FailRequired, _) => Err(InvocationError::TransactionRequired {
                method: invocation.method().clone(),
            }),
            (Action::FailNotAllowed, _) => Err(InvocationError::TransactionNotAllowed {
                method: invocation.method().clone(),
            }),
            (Action::InCallerTransaction, Some(tx)) => {
                self.invoke_in_caller_tx(invocation, component.as_ref(), &tx)
            }
            (Action::NoTransaction, _) => self.invoke_in_no_tx(invocation, component.as_ref()),
            (Action::SuspendThenNoTransaction, _) => {
                let _suspended = SuspendGuard::suspend(tm.as_ref())?;
                self.invoke_in_no_tx(invocation, component.as_ref())
            }
            (Action::OwnTransaction, _) => self.invoke_in_our_tx(
                invocation,
                component.as_ref(),
                tm.as_ref(),
                &timeout,
                resolved.timeout,
            ),
            (Action::SuspendThenOwnTransaction, _) => {
                let _suspended = SuspendGuard::suspend(tm.as_ref())?;
                self.invoke_in_our_tx(
                    invocation,
                    component.as_ref(),
                    tm.as_ref(),
                    &timeout,
                    resolved.timeout,
                )
            }
            (Action::InCallerTransaction, None) => Err(TransactionError::NoTransaction.into()),
        }
    }
}
