//! Invocation context and interceptor chain.
//!
//! A call enters an [`InterceptorChain`] with an [`InvocationContext`] and a
//! target closure standing in for the business method. Each interceptor
//! receives the [`Invocation`] and calls [`Invocation::proceed`] to hand the
//! call to the next layer; `proceed` may be called more than once (retries).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::component::{Component, InterfaceKind, MethodId};
use crate::error::{InvocationError, Result};

/// One layer around the business method.
pub trait Interceptor<T>: Send + Sync {
    fn process(&self, invocation: &mut Invocation<'_, T>) -> Result<T>;
}

/// The business method at the end of a chain.
pub type Target<T> = dyn Fn(&Invocation<'_, T>) -> Result<T> + Send + Sync;

/// Values attached to an invocation, keyed by their type.
#[derive(Default, Clone)]
pub struct PrivateData {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl PrivateData {
    pub fn insert<V: Any + Send + Sync>(&mut self, value: Arc<V>) {
        self.entries.insert(TypeId::of::<V>(), value);
    }

    pub fn get<V: Any + Send + Sync>(&self) -> Option<Arc<V>> {
        self.entries
            .get(&TypeId::of::<V>())
            .and_then(|value| Arc::clone(value).downcast::<V>().ok())
    }
}

/// Private-data entry holding the component being invoked.
#[derive(Clone)]
pub struct ComponentRef(pub Arc<dyn Component>);

/// Data describing one inbound call.
#[derive(Clone)]
pub struct InvocationContext {
    method: MethodId,
    interface: InterfaceKind,
    private_data: PrivateData,
}

impl InvocationContext {
    pub fn new(method: impl Into<MethodId>, interface: InterfaceKind) -> Self {
        Self {
            method: method.into(),
            interface,
            private_data: PrivateData::default(),
        }
    }

    pub fn with_component(self, component: Arc<dyn Component>) -> Self {
        self.with_private_data(Arc::new(ComponentRef(component)))
    }

    pub fn with_private_data<V: Any + Send + Sync>(mut self, value: Arc<V>) -> Self {
        self.private_data.insert(value);
        self
    }
}

/// An invocation travelling through a chain.
pub struct Invocation<'a, T> {
    context: InvocationContext,
    interceptors: &'a [Arc<dyn Interceptor<T>>],
    position: usize,
    target: &'a Target<T>,
}

impl<'a, T> Invocation<'a, T> {
    pub fn method(&self) -> &MethodId {
        &self.context.method
    }

    pub fn interface(&self) -> InterfaceKind {
        self.context.interface
    }

    pub fn private_data<V: Any + Send + Sync>(&self) -> Option<Arc<V>> {
        self.context.private_data.get::<V>()
    }

    /// The component this call targets.
    pub fn component(&self) -> Result<Arc<dyn Component>> {
        self.private_data::<ComponentRef>()
            .map(|r| Arc::clone(&r.0))
            .ok_or(InvocationError::MissingPrivateData("component"))
    }

    /// Hands the call to the next interceptor, or to the target after the last one.
    pub fn proceed(&mut self) -> Result<T> {
        let interceptors = self.interceptors;
        match interceptors.get(self.position) {
            Some(next) => {
                self.position += 1;
                let result = next.process(self);
                self.position -= 1;
                result
            }
            None => (self.target)(self),
        }
    }
}

/// Ordered interceptors applied to every call made through the chain.
pub struct InterceptorChain<T> {
    interceptors: Vec<Arc<dyn Interceptor<T>>>,
}

impl<T> InterceptorChain<T> {
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    /// Appends an interceptor; earlier interceptors wrap later ones.
    pub fn with(mut self, interceptor: Arc<dyn Interceptor<T>>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn invoke(&self, context: InvocationContext, target: &Target<T>) -> Result<T> {
        let mut invocation = Invocation {
            context,
            interceptors: &self.interceptors,
            position: 0,
            target,
        };
        invocation.proceed()
    }
}

impl<T> Default for InterceptorChain<T> {
    fn default() -> Self {
        Self::new()
    }
}
