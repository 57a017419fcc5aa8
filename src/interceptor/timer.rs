//! Transaction demarcation for timer callbacks.

use std::sync::Arc;

use super::backoff::Backoff;
use super::cmt::CmtInterceptor;
use crate::component::TransactionAttribute;
use crate::config::InterceptorConfig;
use crate::error::Result;
use crate::invocation::{Interceptor, Invocation};

/// Runs every timeout callback in a transaction of its own.
///
/// If that transaction ends doomed, the caller receives
/// [`InvocationError::TimerRolledBack`](crate::error::InvocationError::TimerRolledBack)
/// so the timer service can schedule a retry of the timeout.
pub struct TimerInterceptor {
    inner: CmtInterceptor,
}

impl TimerInterceptor {
    pub fn new(config: InterceptorConfig) -> Self {
        Self {
            inner: CmtInterceptor::with_fixed_attribute(TransactionAttribute::RequiresNew, config)
                .signal_timer_rollback(),
        }
    }

    pub fn with_backoff(self, backoff: Arc<dyn Backoff>) -> Self {
        Self {
            inner: self.inner.with_backoff(backoff),
        }
    }
}

impl<T> Interceptor<T> for TimerInterceptor {
    fn process(&self, invocation: &mut Invocation<'_, T>) -> Result<T> {
        self.inner.process(invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentKind, InterfaceKind, SimpleComponent};
    use crate::error::{Fault, InvocationError};
    use crate::invocation::{InterceptorChain, InvocationContext};
    use crate::transaction::{LocalTransactionManager, TransactionManager};

    fn setup() -> (Arc<LocalTransactionManager>, InvocationContext, InterceptorChain<()>) {
        let tm = Arc::new(LocalTransactionManager::new());
        let component: Arc<dyn Component> = Arc::new(
            SimpleComponent::builder("ReminderBean", ComponentKind::Singleton, tm.clone())
                // Ignored: timers always get their own transaction.
                .default_attribute(TransactionAttribute::Never)
                .application_exception("ReminderSkipped", true)
                .build(),
        );
        let context =
            InvocationContext::new("onTimeout", InterfaceKind::Timer).with_component(component);
        let chain = InterceptorChain::<()>::new()
            .with(Arc::new(TimerInterceptor::new(InterceptorConfig::default())));
        (tm, context, chain)
    }

    #[test]
    fn test_successful_timeout_commits() {
        let (tm, context, chain) = setup();
        chain.invoke(context, &|_: &Invocation<'_, ()>| Ok(())).unwrap();
        assert_eq!((tm.stats().begun, tm.stats().committed), (1, 1));
    }

    #[test]
    fn test_runs_in_new_transaction_despite_caller() {
        let (tm, context, chain) = setup();
        tm.begin().unwrap();
        let caller = tm.transaction().unwrap().unwrap().id();

        let tm_in = Arc::clone(&tm);
        chain
            .invoke(context, &move |_: &Invocation<'_, ()>| {
                let inner = tm_in.transaction().unwrap().unwrap().id();
                assert_ne!(inner, caller);
                Ok(())
            })
            .unwrap();

        assert_eq!(tm.transaction().unwrap().unwrap().id(), caller);
    }

    #[test]
    fn test_marked_rollback_signals_timer_rollback() {
        let (tm, context, chain) = setup();

        let tm_in = Arc::clone(&tm);
        let err = chain
            .invoke(context, &move |_: &Invocation<'_, ()>| {
                tm_in.transaction().unwrap().unwrap().set_rollback_only().unwrap();
                Ok(())
            })
            .unwrap_err();

        assert_eq!(err, InvocationError::TimerRolledBack);
        assert_eq!(tm.stats().rolled_back, 1);
    }

    #[test]
    fn test_rollback_application_exception_signals_timer_rollback() {
        let (tm, context, chain) = setup();

        let err = chain
            .invoke(context, &|_: &Invocation<'_, ()>| {
                Err(Fault::checked("ReminderSkipped", "holiday").into())
            })
            .unwrap_err();

        assert_eq!(err, InvocationError::TimerRolledBack);
        assert!(tm.transaction().unwrap().is_none());
    }
}
