//! Error taxonomy.
//!
//! Two families, kept deliberately apart:
//!
//! - [`Error`] — usage and infrastructure failures: registering middleware
//!   after startup, reversing an unknown route name, a closed transport
//!   channel. These are bugs or environment problems, not responses.
//! - [`HttpError`] — an error that *is* a response in waiting. Raise it from
//!   a handler (or let the router raise 404/405) and the exception
//!   middleware renders it with its status and detail.
//!
//! Everything flowing through the dispatch chain travels as a
//! [`DispatchError`]: a shared, type-erased error. It is `Arc`, not `Box`,
//! because the same value is inspected by the handler registry, handed to a
//! user handler, and still re-raised to the host afterwards — three owners,
//! one error.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use thiserror::Error;

/// A type-erased error moving through the dispatch chain.
///
/// Any `E: std::error::Error + Send + Sync + 'static` converts into it with
/// `?`, exactly as it would into a boxed error.
pub type DispatchError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Usage and infrastructure errors raised by atrium itself.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration was mutated after the middleware stack was built.
    #[error("cannot modify the application after it has started")]
    AlreadyStarted,

    /// The transport side of the connection channel is gone.
    #[error("transport channel closed")]
    ChannelClosed,

    /// URL reversal was asked for a name no route registered.
    #[error("no route named `{0}`")]
    UnknownRoute(String),

    /// URL reversal was given too few parameters.
    #[error("route `{name}` is missing parameter `{param}`")]
    MissingParam { name: String, param: String },

    /// URL reversal was given a parameter the route does not take.
    #[error("route `{name}` does not take parameter `{param}`")]
    UnknownParam { name: String, param: String },

    /// A streaming scope reached the router, which only routes HTTP.
    #[error("streaming scopes are not routable")]
    UnroutableScope,

    /// URL reversal or state access on a scope never dispatched through an
    /// application.
    #[error("scope is not attached to an application")]
    DetachedScope,
}

// `Arc<dyn Error>` has no blanket `From<E: Error>` the way `Box<dyn Error>`
// does, so `?` and `.into()` on the crate's own error types need these
// concrete conversions spelled out.
impl From<Error> for DispatchError {
    fn from(err: Error) -> Self {
        Arc::new(err)
    }
}

// ── HttpError ─────────────────────────────────────────────────────────────────

/// An error carrying an HTTP status, raised to short-circuit a request.
///
/// The exception middleware ships a default renderer for it: plain text
/// `detail` with the error's status (no body for 204/304). Register your own
/// handler for the type — or for a single status code — to override it.
///
/// ```rust
/// use atrium::HttpError;
/// use http::StatusCode;
///
/// let err = HttpError::with_detail(StatusCode::FORBIDDEN, "members only")
///     .header("www-authenticate", "Bearer");
/// assert_eq!(err.status(), StatusCode::FORBIDDEN);
/// ```
#[derive(Debug, Clone)]
pub struct HttpError {
    status: StatusCode,
    detail: String,
    headers: Vec<(String, String)>,
}

impl HttpError {
    /// An `HttpError` whose detail is the status's canonical reason phrase.
    pub fn new(status: StatusCode) -> Self {
        let detail = status.canonical_reason().unwrap_or("").to_owned();
        Self { status, detail, headers: Vec::new() }
    }

    /// An `HttpError` with an explicit detail message.
    pub fn with_detail(status: StatusCode, detail: impl Into<String>) -> Self {
        Self { status, detail: detail.into(), headers: Vec::new() }
    }

    /// Attach a header to the rendered response. Chainable.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.as_u16(), self.detail)
    }
}

impl std::error::Error for HttpError {}

impl From<HttpError> for DispatchError {
    fn from(err: HttpError) -> Self {
        Arc::new(err)
    }
}

// ── ResponseStarted ───────────────────────────────────────────────────────────

/// Raised when a handled error is caught after the response already began.
///
/// The first bytes of a response are on the wire; sending a second one would
/// corrupt the stream. The original error is preserved as [`source`] so the
/// host can still see what actually failed.
///
/// [`source`]: std::error::Error::source
#[derive(Debug)]
pub struct ResponseStarted {
    source: DispatchError,
}

impl ResponseStarted {
    pub(crate) fn raise(source: DispatchError) -> DispatchError {
        Arc::new(Self { source })
    }

    /// The error that was caught too late to handle.
    pub fn original(&self) -> &DispatchError {
        &self.source
    }
}

impl fmt::Display for ResponseStarted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "caught a handled error, but the response already started")
    }
}

impl std::error::Error for ResponseStarted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
