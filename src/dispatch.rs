//! The dispatch contract and type erasure.
//!
//! # How the stack is stored
//!
//! The middleware stack is a chain of *different* concrete types — the
//! server-error wrapper, user middleware, the exception wrapper, the router —
//! each closing over the next. A chain of distinct types needs a common
//! interface to hang together, so every layer is erased behind
//! `dyn Dispatch` and shared as a [`Dispatcher`].
//!
//! The chain from a scope to a handler is:
//!
//! ```text
//! Application::handle(scope, receive, send)
//!        ↓ OnceLock — built once, reused forever
//! ServerErrorMiddleware → user middleware… → ExceptionMiddleware → Router
//!        ↓ one Arc clone + one virtual call per layer
//! handler(request) → Response → send channel
//! ```
//!
//! The per-dispatch cost of the erasure is an `Arc` clone and a vtable call
//! per layer — noise next to the I/O the connection exists for.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::channel::{Receiver, Sender};
use crate::error::DispatchError;
use crate::scope::Scope;

/// A heap-allocated, type-erased dispatch future.
///
/// `Pin<Box<…>>` because the runtime polls it in place; `Send + 'static` so
/// the outer scheduler may move it across worker threads.
pub type DispatchFuture = Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send + 'static>>;

/// Anything that can process one connection scope end to end.
///
/// This is the single contract every layer of the stack implements: the
/// application itself, both supervision middlewares, user middleware, and
/// the router. An `Ok(())` means the connection completed from the
/// transport's point of view; an `Err` is a raised error travelling outward
/// through the supervision layers.
pub trait Dispatch: Send + Sync + 'static {
    fn dispatch(&self, scope: Scope, receive: Receiver, send: Sender) -> DispatchFuture;
}

/// A shared, type-erased dispatchable — the unit the stack is built from.
pub type Dispatcher = Arc<dyn Dispatch>;

// ── Closure adapter ───────────────────────────────────────────────────────────

/// Newtype adapter turning an async closure into a [`Dispatch`].
///
/// ```rust
/// use atrium::{DispatchError, DispatchFn, Dispatcher, Receiver, Scope, Sender};
/// use std::sync::Arc;
///
/// let app: Dispatcher = Arc::new(DispatchFn(|_scope: Scope, _rx: Receiver, _tx: Sender| async move {
///     Ok::<(), DispatchError>(())
/// }));
/// ```
pub struct DispatchFn<F>(pub F);

impl<F, Fut> Dispatch for DispatchFn<F>
where
    F: Fn(Scope, Receiver, Sender) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DispatchError>> + Send + 'static,
{
    fn dispatch(&self, scope: Scope, receive: Receiver, send: Sender) -> DispatchFuture {
        Box::pin((self.0)(scope, receive, send))
    }
}

/// Wraps an async closure into a shared [`Dispatcher`].
pub fn from_fn<F, Fut>(f: F) -> Dispatcher
where
    F: Fn(Scope, Receiver, Sender) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DispatchError>> + Send + 'static,
{
    Arc::new(DispatchFn(f))
}
