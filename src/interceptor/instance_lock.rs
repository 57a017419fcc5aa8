//! Serializes access to a stateful component instance.
//!
//! The instance lock is owned by the caller's transaction when there is one,
//! so every call made within the same transaction may re-enter the instance
//! from any thread. Without a transaction the calling thread owns it.

use std::time::Duration;

use crate::component::{LockOwner, StatefulInstance};
use crate::config::InterceptorConfig;
use crate::error::{InvocationError, Result};
use crate::invocation::{Interceptor, Invocation};

pub struct InstanceLockInterceptor {
    access_timeout: Option<Duration>,
}

impl InstanceLockInterceptor {
    pub fn new(config: &InterceptorConfig) -> Self {
        Self {
            access_timeout: config.access_timeout(),
        }
    }
}

impl<T> Interceptor<T> for InstanceLockInterceptor {
    fn process(&self, invocation: &mut Invocation<'_, T>) -> Result<T> {
        let component = invocation.component()?;
        let instance = invocation
            .private_data::<StatefulInstance>()
            .ok_or(InvocationError::MissingPrivateData("stateful instance"))?;
        if instance.is_removed() {
            return Err(InvocationError::NoSuchInstance(instance.id().to_string()));
        }

        let owner = LockOwner::current(component.transaction_manager().as_ref())?;
        let _guard = match self.access_timeout {
            Some(timeout) => instance.lock().try_lock(&owner, timeout)?.ok_or_else(|| {
                InvocationError::ConcurrentAccessTimeout {
                    component: component.name().to_string(),
                    timeout,
                }
            })?,
            None => instance.lock().lock(&owner)?,
        };
        log::debug!("{:?} holds instance {}", owner, instance.id());

        // Removal may have happened while this call waited for the lock.
        if instance.is_removed() {
            return Err(InvocationError::NoSuchInstance(instance.id().to_string()));
        }
        invocation.proceed()
    }
}
