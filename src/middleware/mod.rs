//! Middleware layer.
//!
//! Middleware intercepts dispatches on their way to the router and is the
//! right place for cross-cutting concerns: structured tracing, metrics,
//! request-id injection, and authentication-header inspection.
//!
//! A [`Middleware`] is a *descriptor*: a named factory held until the
//! application builds its stack, then applied outermost-first so each layer
//! closes over the next. Construction is deferred so the stack can be built
//! from declarative data, exactly once.
//!
//! Two middlewares are always present without being registered:
//! [`ServerErrorMiddleware`](errors::ServerErrorMiddleware) outermost and
//! [`ExceptionMiddleware`](exceptions::ExceptionMiddleware) innermost. User
//! middleware runs between them, in registration order on the way in and
//! reverse order on the way out.

pub mod errors;
pub mod exceptions;

use std::future::Future;
use std::sync::Arc;

use crate::channel::{Receiver, Sender};
use crate::dispatch::{DispatchFn, Dispatcher};
use crate::error::DispatchError;
use crate::scope::Scope;

/// A named, deferred middleware factory.
///
/// The factory receives the next layer and returns the wrapped layer. Any
/// configuration lives in the closure — the moral equivalent of
/// constructor arguments, captured instead of passed.
#[derive(Clone)]
pub struct Middleware {
    name: &'static str,
    wrap: Arc<dyn Fn(Dispatcher) -> Dispatcher + Send + Sync>,
}

impl Middleware {
    /// A middleware from a layer factory.
    ///
    /// ```rust
    /// use atrium::middleware::Middleware;
    /// use atrium::{Dispatch, DispatchFn, Dispatcher};
    /// use std::sync::Arc;
    ///
    /// let passthrough = Middleware::new("passthrough", |next: Dispatcher| {
    ///     Arc::new(DispatchFn(move |scope, receive, send| {
    ///         let next = next.clone();
    ///         async move { next.dispatch(scope, receive, send).await }
    ///     })) as Dispatcher
    /// });
    /// # let _ = passthrough;
    /// ```
    pub fn new(
        name: &'static str,
        wrap: impl Fn(Dispatcher) -> Dispatcher + Send + Sync + 'static,
    ) -> Self {
        Self { name, wrap: Arc::new(wrap) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn wrap(&self, next: Dispatcher) -> Dispatcher {
        (self.wrap)(next)
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Middleware").field(&self.name).finish()
    }
}

/// Sugar for the common case: a middleware from one async function that
/// receives the connection plus the next layer.
///
/// ```rust
/// use atrium::Dispatch;
/// use atrium::middleware::from_fn;
///
/// let trace = from_fn("trace", |scope, receive, send, next| async move {
///     tracing::info!(path = scope.path(), "dispatch in");
///     let out = next.dispatch(scope, receive, send).await;
///     tracing::info!(ok = out.is_ok(), "dispatch out");
///     out
/// });
/// # let _ = trace;
/// ```
pub fn from_fn<F, Fut>(name: &'static str, f: F) -> Middleware
where
    F: Fn(Scope, Receiver, Sender, Dispatcher) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DispatchError>> + Send + 'static,
{
    Middleware::new(name, move |next| {
        let f = f.clone();
        Arc::new(DispatchFn(move |scope, receive, send| {
            f(scope, receive, send, next.clone())
        })) as Dispatcher
    })
}
