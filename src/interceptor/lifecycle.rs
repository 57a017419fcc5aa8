//! Transaction demarcation for lifecycle callbacks (post-construct, pre-destroy,
//! passivation).
//!
//! Lifecycle callbacks only ever run in a new transaction or in none. The
//! attribute is decided once, when the interceptor is built:
//!
//! | component kind | configured | effective |
//! |---|---|---|
//! | stateless, singleton, message-driven | REQUIRED | REQUIRES_NEW |
//! | stateful | REQUIRED | NOT_SUPPORTED |
//! | any | REQUIRES_NEW | REQUIRES_NEW |
//! | any | NOT_SUPPORTED | NOT_SUPPORTED |
//! | any | MANDATORY, NEVER, SUPPORTS | NOT_SUPPORTED |

use std::sync::Arc;

use super::backoff::Backoff;
use super::cmt::CmtInterceptor;
use crate::component::{ComponentKind, TransactionAttribute};
use crate::config::InterceptorConfig;
use crate::error::Result;
use crate::invocation::{Interceptor, Invocation};

/// Whether REQUIRED on a lifecycle callback of `kind` becomes REQUIRES_NEW.
fn treats_required_as_requires_new(kind: ComponentKind) -> bool {
    !matches!(kind, ComponentKind::Stateful)
}

/// Effective attribute for a lifecycle callback.
///
/// `configured` is `None` when the deployment did not name an attribute, in
/// which case REQUIRED is assumed and no warning is emitted.
pub fn lifecycle_attribute(
    component: &str,
    kind: ComponentKind,
    configured: Option<TransactionAttribute>,
) -> TransactionAttribute {
    use TransactionAttribute::*;

    let requested = configured.unwrap_or(Required);
    let effective = match requested {
        Required if treats_required_as_requires_new(kind) => RequiresNew,
        RequiresNew | NotSupported => requested,
        _ => NotSupported,
    };

    if configured.is_some() && effective == NotSupported && requested != NotSupported {
        log::warn!(
            "{} bean {}: transaction attribute {} is not allowed on lifecycle callbacks, using {}",
            kind,
            component,
            requested,
            effective
        );
    }
    effective
}

/// Interceptor for lifecycle callbacks with an attribute fixed at construction.
pub struct LifecycleInterceptor {
    inner: CmtInterceptor,
    attribute: TransactionAttribute,
}

impl LifecycleInterceptor {
    pub fn new(
        component: &str,
        kind: ComponentKind,
        configured: Option<TransactionAttribute>,
        config: InterceptorConfig,
    ) -> Self {
        let attribute = lifecycle_attribute(component, kind, configured);
        Self {
            inner: CmtInterceptor::with_fixed_attribute(attribute, config),
            attribute,
        }
    }

    pub fn with_backoff(self, backoff: Arc<dyn Backoff>) -> Self {
        Self {
            inner: self.inner.with_backoff(backoff),
            attribute: self.attribute,
        }
    }

    pub fn attribute(&self) -> TransactionAttribute {
        self.attribute
    }
}

impl<T> Interceptor<T> for LifecycleInterceptor {
    fn process(&self, invocation: &mut Invocation<'_, T>) -> Result<T> {
        self.inner.process(invocation)
    }
}
