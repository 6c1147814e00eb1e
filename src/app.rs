//! The application: configuration, the middleware stack, and dispatch.
//!
//! # Lifecycle
//!
//! Two phases, with a hard line between them:
//!
//! 1. **Configure** — [`AppBuilder`] collects the debug flag, router,
//!    middleware and exception handlers; [`Application`] still accepts
//!    late registrations.
//! 2. **Started** — the first dispatch (or an explicit [`Application::start`])
//!    builds the middleware stack exactly once, behind a single-assignment
//!    `OnceLock`, and freezes configuration. Registering anything after
//!    that fails with [`Error::AlreadyStarted`] — immediately, not at
//!    request time.
//!
//! # Stack shape
//!
//! ```text
//! ServerErrorMiddleware            ← outermost, catch anything
//!   └ user middleware, in order    ← first registered runs first
//!       └ ExceptionMiddleware      ← registered handlers live here
//!           └ Router               ← routes, raises 404/405
//! ```
//!
//! The stack is built right to left — innermost first — so each layer
//! closes over the next; once built it is immutable and shared read-only
//! by every concurrent dispatch.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::channel::{Receiver, Sender};
use crate::dispatch::{Dispatch, DispatchFuture, Dispatcher};
use crate::error::{DispatchError, Error};
use crate::handlers::{ErrorRef, ExceptionHandler, ExceptionHandlers};
use crate::middleware::Middleware;
use crate::middleware::errors::ServerErrorMiddleware;
use crate::middleware::exceptions::ExceptionMiddleware;
use crate::router::Router;
use crate::scope::Scope;
use crate::state::State;

struct AppInner {
    debug: bool,
    state: State,
    router: Arc<Router>,
    handlers: Mutex<ExceptionHandlers>,
    middleware: Mutex<Vec<Middleware>>,
    stack: OnceLock<Dispatcher>,
}

/// The application object: owns configuration, builds the middleware stack
/// once, and dispatches connection scopes through it.
///
/// Cloning is cheap and shares everything — the clone a dispatch stores
/// into its scope is the same application.
///
/// ```rust
/// use atrium::{Application, Request, Response, Router};
///
/// async fn hello(_req: Request) -> Result<Response, atrium::HttpError> {
///     Ok(Response::text("hi"))
/// }
///
/// let app = Application::builder()
///     .router(Router::new().get("/hello", hello))
///     .build();
/// # let _ = app;
/// ```
#[derive(Clone)]
pub struct Application {
    inner: Arc<AppInner>,
}

impl Application {
    /// An application over `router` with default configuration.
    pub fn new(router: Router) -> Self {
        Self::builder().router(router).build()
    }

    /// The configure phase.
    pub fn builder() -> AppBuilder {
        AppBuilder {
            debug: false,
            router: Router::new(),
            middleware: Vec::new(),
            handlers: ExceptionHandlers::new(),
        }
    }

    pub fn debug(&self) -> bool {
        self.inner.debug
    }

    /// The process-wide shared state bag.
    pub fn state(&self) -> &State {
        &self.inner.state
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Reverses a named route. Pure lookup, no side effects.
    pub fn url_path_for(&self, name: &str, params: &[(&str, &str)]) -> Result<String, Error> {
        self.inner.router.url_path_for(name, params)
    }

    /// Whether the middleware stack has been built.
    pub fn started(&self) -> bool {
        self.inner.stack.get().is_some()
    }

    /// Builds the middleware stack now, or returns the existing one.
    ///
    /// Calling this during startup makes the build explicit instead of a
    /// first-request side effect. Idempotent: every call returns the same
    /// stack (`Arc::ptr_eq` holds across calls).
    pub fn start(&self) -> Dispatcher {
        self.inner
            .stack
            .get_or_init(|| self.build_middleware_stack())
            .clone()
    }

    /// Registers a middleware, wrapping everything registered so far
    /// (insert at the front — the newest registration runs outermost
    /// among user middleware).
    ///
    /// Fails with [`Error::AlreadyStarted`] once the stack exists.
    pub fn add_middleware(&self, middleware: Middleware) -> Result<(), Error> {
        if self.started() {
            return Err(Error::AlreadyStarted);
        }
        self.inner.middleware.lock().insert(0, middleware);
        Ok(())
    }

    /// Registers an exception handler for one concrete error type.
    ///
    /// Fails with [`Error::AlreadyStarted`] once the stack exists.
    pub fn add_error_handler<T: std::error::Error + Send + Sync + 'static>(
        &self,
        handler: ExceptionHandler,
    ) -> Result<(), Error> {
        if self.started() {
            return Err(Error::AlreadyStarted);
        }
        self.inner.handlers.lock().on_type::<T>(handler);
        Ok(())
    }

    /// Registers an exception handler for one exact status code.
    ///
    /// Fails with [`Error::AlreadyStarted`] once the stack exists.
    pub fn add_status_handler(
        &self,
        status: http::StatusCode,
        handler: ExceptionHandler,
    ) -> Result<(), Error> {
        if self.started() {
            return Err(Error::AlreadyStarted);
        }
        self.inner.handlers.lock().on_status(status, handler);
        Ok(())
    }

    /// Registers the catch-all server-error handler.
    ///
    /// Fails with [`Error::AlreadyStarted`] once the stack exists.
    pub fn add_server_error_handler(&self, handler: ExceptionHandler) -> Result<(), Error> {
        if self.started() {
            return Err(Error::AlreadyStarted);
        }
        self.inner.handlers.lock().catch_all(handler);
        Ok(())
    }

    /// The dispatch entry point: one call per inbound connection scope.
    ///
    /// Stores the application into the scope, builds the stack on first
    /// use, and runs the scope through it. The returned error — if any —
    /// is the re-raised original, for host-level logging; by the time it
    /// surfaces, the transport has already been given a terminal response
    /// where one was possible.
    pub async fn handle(
        &self,
        mut scope: Scope,
        receive: Receiver,
        send: Sender,
    ) -> Result<(), DispatchError> {
        scope.attach_app(self.clone());
        let stack = self.start();
        stack.dispatch(scope, receive, send).await
    }

    fn build_middleware_stack(&self) -> Dispatcher {
        let inner = &self.inner;
        let (error_handler, table) = inner.handlers.lock().clone().partition();

        let mut app: Dispatcher = Arc::new(ExceptionMiddleware::new(
            inner.router.clone(),
            table,
            inner.debug,
        ));

        let middleware = inner.middleware.lock();
        for mw in middleware.iter().rev() {
            app = mw.wrap(app);
        }
        let names: Vec<_> = middleware.iter().map(Middleware::name).collect();
        drop(middleware);

        debug!(user_middleware = ?names, "middleware stack built");
        info!(debug = inner.debug, "application started");

        Arc::new(ServerErrorMiddleware::new(app, error_handler, inner.debug))
    }
}

impl Dispatch for Application {
    fn dispatch(&self, scope: Scope, receive: Receiver, send: Sender) -> DispatchFuture {
        let app = self.clone();
        Box::pin(async move { app.handle(scope, receive, send).await })
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("debug", &self.inner.debug)
            .field("started", &self.started())
            .finish_non_exhaustive()
    }
}

// ── AppBuilder ────────────────────────────────────────────────────────────────

/// The configure phase of an [`Application`]. Chainable; finish with
/// [`build`](Self::build).
///
/// ```rust
/// use atrium::middleware::from_fn;
/// use atrium::{Application, Dispatch, ExceptionHandler, Response, Router};
/// use http::StatusCode;
///
/// let app = Application::builder()
///     .debug(true)
///     .router(Router::new())
///     .middleware(from_fn("noop", |scope, receive, send, next| async move {
///         next.dispatch(scope, receive, send).await
///     }))
///     .on_status(
///         StatusCode::IM_A_TEAPOT,
///         ExceptionHandler::sync(|_req, _err| {
///             Ok::<_, atrium::HttpError>(Response::text("short and stout"))
///         }),
///     )
///     .build();
/// # let _ = app;
/// ```
pub struct AppBuilder {
    debug: bool,
    router: Router,
    middleware: Vec<Middleware>,
    handlers: ExceptionHandlers,
}

impl AppBuilder {
    /// Enables debug-mode diagnostics: unhandled errors render a traceback
    /// page instead of the plain 500. Never enable in production — the
    /// page exposes internals.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Appends a user middleware. Constructor order is execution order:
    /// the first registered runs outermost.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Registers an exception handler for one concrete error type.
    pub fn on_error<T: std::error::Error + Send + Sync + 'static>(
        mut self,
        handler: ExceptionHandler,
    ) -> Self {
        self.handlers.on_type::<T>(handler);
        self
    }

    /// Registers an exception handler for a family of errors, matched by
    /// predicate after exact types. Register most-specific first.
    pub fn on_error_family(
        mut self,
        name: &'static str,
        matches: impl Fn(&ErrorRef) -> bool + Send + Sync + 'static,
        handler: ExceptionHandler,
    ) -> Self {
        self.handlers.on_family(name, matches, handler);
        self
    }

    /// Registers an exception handler for one exact status code. Status
    /// 500 designates the server-error handler.
    pub fn on_status(mut self, status: http::StatusCode, handler: ExceptionHandler) -> Self {
        self.handlers.on_status(status, handler);
        self
    }

    /// Registers the catch-all server-error handler: invoked by the
    /// outermost middleware for any otherwise-unhandled error; its
    /// response is sent and the error still re-raises.
    pub fn on_server_error(mut self, handler: ExceptionHandler) -> Self {
        self.handlers.catch_all(handler);
        self
    }

    pub fn build(self) -> Application {
        Application {
            inner: Arc::new(AppInner {
                debug: self.debug,
                state: State::new(),
                router: Arc::new(self.router),
                handlers: Mutex::new(self.handlers),
                middleware: Mutex::new(self.middleware),
                stack: OnceLock::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::from_fn;

    #[test]
    fn start_is_idempotent() {
        let app = Application::new(Router::new());
        let first = app.start();
        let second = app.start();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn registration_freezes_at_start() {
        let app = Application::new(Router::new());
        let noop = from_fn("noop", |scope, receive, send, next: Dispatcher| async move {
            next.dispatch(scope, receive, send).await
        });
        assert!(app.add_middleware(noop.clone()).is_ok());

        app.start();

        assert!(matches!(app.add_middleware(noop), Err(Error::AlreadyStarted)));
        assert!(matches!(
            app.add_server_error_handler(ExceptionHandler::sync(|_req, _err| {
                Ok::<_, crate::error::HttpError>(crate::response::Response::text("x"))
            })),
            Err(Error::AlreadyStarted)
        ));
    }

    #[test]
    fn clones_share_the_stack() {
        let app = Application::new(Router::new());
        let clone = app.clone();
        let first = app.start();
        let second = clone.start();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(clone.started());
    }
}
