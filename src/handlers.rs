//! Exception handler registry.
//!
//! One registry, four partitions:
//!
//! - **status entries** — exact status-code matches, consulted first when
//!   the raised error is an [`HttpError`]. Exact integer match only, no
//!   fallback.
//! - **type entries** — exact concrete error types, keyed by `TypeId`.
//! - **family entries** — an ordered list of (predicate, handler) pairs,
//!   checked from most- to least-specific in registration order. This is
//!   the explicit rendition of "walk the ancestor chain": a family entry
//!   covers every error its predicate accepts, and an exact type entry
//!   always outranks it.
//! - **the catch-all slot** — the base entry, filled by registering for
//!   status 500 or for any error. It is never consulted during lookup;
//!   the stack builder peels it off and hands it to the server-error
//!   middleware, which is the only layer allowed to run it.
//!
//! Registering the same type, status, or family name twice replaces the
//! earlier entry.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::future::{Future, ready};
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;

use crate::error::{DispatchError, HttpError};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// The raw error view handed to family predicates.
pub type ErrorRef = dyn std::error::Error + Send + Sync + 'static;

/// A type-erased future resolving to a handler's response.
pub type ResponseFuture =
    Pin<Box<dyn Future<Output = Result<Response, DispatchError>> + Send + 'static>>;

// ── ExceptionHandler ──────────────────────────────────────────────────────────

/// A user-supplied callable converting a raised error into a response.
///
/// Handlers take the request view and the raised error, and may suspend
/// cooperatively. A handler returning `Err` is itself a raised error — it
/// propagates to the outer supervision layer uncaught.
///
/// ```rust
/// use atrium::{ExceptionHandler, HttpError, Response};
/// use http::StatusCode;
///
/// // async
/// let h = ExceptionHandler::new(|_req, err| async move {
///     Ok::<_, HttpError>(Response::text(err.to_string()))
/// });
///
/// // sync — no suspension needed
/// let h = ExceptionHandler::sync(|_req, _err| {
///     Ok::<_, HttpError>(Response::status(StatusCode::BAD_REQUEST))
/// });
/// ```
#[derive(Clone)]
pub struct ExceptionHandler {
    f: Arc<dyn Fn(Request, DispatchError) -> ResponseFuture + Send + Sync>,
}

impl ExceptionHandler {
    /// Wraps an async handler.
    pub fn new<F, Fut, R, E>(f: F) -> Self
    where
        F: Fn(Request, DispatchError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: IntoResponse + Send + 'static,
        E: Into<DispatchError> + Send + 'static,
    {
        Self {
            f: Arc::new(move |request, error| {
                let fut = f(request, error);
                Box::pin(async move {
                    fut.await
                        .map(IntoResponse::into_response)
                        .map_err(Into::into)
                })
            }),
        }
    }

    /// Wraps a synchronous handler. Both forms run identically inside the
    /// dispatch chain.
    pub fn sync<F, R, E>(f: F) -> Self
    where
        F: Fn(Request, DispatchError) -> Result<R, E> + Send + Sync + 'static,
        R: IntoResponse + Send + 'static,
        E: Into<DispatchError> + Send + 'static,
    {
        Self::new(move |request, error| ready(f(request, error)))
    }

    pub(crate) fn call(&self, request: Request, error: DispatchError) -> ResponseFuture {
        (self.f)(request, error)
    }
}

impl fmt::Debug for ExceptionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExceptionHandler")
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct TypeEntry {
    type_id: TypeId,
    matches: Arc<dyn Fn(&ErrorRef) -> bool + Send + Sync>,
    handler: ExceptionHandler,
}

#[derive(Clone)]
struct FamilyEntry {
    name: &'static str,
    matches: Arc<dyn Fn(&ErrorRef) -> bool + Send + Sync>,
    handler: ExceptionHandler,
}

/// The exception handler registry.
#[derive(Clone, Default)]
pub struct ExceptionHandlers {
    types: Vec<TypeEntry>,
    families: Vec<FamilyEntry>,
    statuses: HashMap<u16, ExceptionHandler>,
    catch_all: Option<ExceptionHandler>,
}

impl ExceptionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one concrete error type.
    pub fn on_type<T: std::error::Error + Send + Sync + 'static>(
        &mut self,
        handler: ExceptionHandler,
    ) {
        let type_id = TypeId::of::<T>();
        let entry = TypeEntry {
            type_id,
            matches: Arc::new(|error| error.is::<T>()),
            handler,
        };
        match self.types.iter_mut().find(|e| e.type_id == type_id) {
            Some(existing) => *existing = entry,
            None => self.types.push(entry),
        }
    }

    /// Registers a handler for a *family* of errors — every error the
    /// predicate accepts. Families are checked after exact types, in
    /// registration order: register the most specific family first.
    pub fn on_family(
        &mut self,
        name: &'static str,
        matches: impl Fn(&ErrorRef) -> bool + Send + Sync + 'static,
        handler: ExceptionHandler,
    ) {
        let entry = FamilyEntry { name, matches: Arc::new(matches), handler };
        match self.families.iter_mut().find(|e| e.name == name) {
            Some(existing) => *existing = entry,
            None => self.families.push(entry),
        }
    }

    /// Registers a handler for one exact status code, matched when an
    /// [`HttpError`] with that status is raised.
    ///
    /// Status 500 designates the server-error handler instead, exactly as
    /// [`catch_all`](Self::catch_all) does: the 500 path belongs to the
    /// outermost middleware.
    pub fn on_status(&mut self, status: StatusCode, handler: ExceptionHandler) {
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            self.catch_all = Some(handler);
        } else {
            self.statuses.insert(status.as_u16(), handler);
        }
    }

    /// Registers the base entry: the handler for any otherwise-unhandled
    /// error. Routed to the server-error middleware at build time; its
    /// response is sent and the error is still re-raised.
    pub fn catch_all(&mut self, handler: ExceptionHandler) {
        self.catch_all = Some(handler);
    }

    /// Resolves the handler for a raised error.
    ///
    /// Precedence: exact status (HTTP-shaped errors only) → exact type →
    /// family chain in registration order → none. The catch-all slot is
    /// not consulted here.
    pub(crate) fn lookup(&self, error: &DispatchError) -> Option<ExceptionHandler> {
        if let Some(http) = error.downcast_ref::<HttpError>() {
            if let Some(handler) = self.statuses.get(&http.status().as_u16()) {
                return Some(handler.clone());
            }
        }
        let error: &ErrorRef = error.as_ref();
        if let Some(entry) = self.types.iter().find(|e| (e.matches)(error)) {
            return Some(entry.handler.clone());
        }
        self.families
            .iter()
            .find(|e| (e.matches)(error))
            .map(|e| e.handler.clone())
    }

    /// Splits the registry for stack construction: the catch-all slot goes
    /// to the server-error middleware, everything else to the exception
    /// middleware.
    pub(crate) fn partition(mut self) -> (Option<ExceptionHandler>, Self) {
        let error_handler = self.catch_all.take();
        (error_handler, self)
    }

    /// Seeds the built-in renderer for [`HttpError`] at the lowest
    /// precedence, unless the user registered their own entry for it.
    pub(crate) fn ensure_http_default(&mut self) {
        let covered = self.types.iter().any(|e| e.type_id == TypeId::of::<HttpError>());
        if covered {
            return;
        }
        self.on_family(
            "http-error",
            |error| error.is::<HttpError>(),
            ExceptionHandler::sync(render_http_error),
        );
    }

}

impl fmt::Debug for ExceptionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionHandlers")
            .field("types", &self.types.len())
            .field("families", &self.families.iter().map(|e| e.name).collect::<Vec<_>>())
            .field("statuses", &self.statuses.keys().collect::<Vec<_>>())
            .field("catch_all", &self.catch_all.is_some())
            .finish()
    }
}

/// Default renderer for raised [`HttpError`]s: plain-text detail with the
/// error's status and headers; bodiless for 204/304.
fn render_http_error(_request: Request, error: DispatchError) -> Result<Response, DispatchError> {
    let Some(http) = error.downcast_ref::<HttpError>() else {
        // Predicate guarantees the downcast; fall back rather than panic.
        return Err(error);
    };
    let mut builder = Response::builder().status(http.status());
    for (name, value) in http.headers() {
        builder = builder.header(name, value);
    }
    if matches!(http.status().as_u16(), 204 | 304) {
        Ok(builder.no_body())
    } else {
        Ok(builder.text(http.detail()))
    }
}
