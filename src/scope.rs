//! Connection scope: the metadata describing one inbound connection.

use std::collections::HashMap;

use http::Method;

use crate::app::Application;

/// What kind of connection a scope describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScopeKind {
    /// A plain request/response exchange. The only kind the exception
    /// machinery renders responses for.
    Http,
    /// A long-lived streaming connection with no single-response concept.
    /// Errors on these propagate unconditionally.
    Stream,
    /// The process lifecycle pseudo-connection (startup/shutdown).
    Lifecycle,
}

/// The metadata for one inbound connection: kind, method, path, headers,
/// and — once dispatched — the owning [`Application`].
///
/// Transports build one `Scope` per connection and pass it to
/// [`Application::handle`]; the router fills in path parameters on a match.
#[derive(Clone, Debug)]
pub struct Scope {
    kind: ScopeKind,
    method: Method,
    path: String,
    headers: Vec<(String, String)>,
    params: HashMap<String, String>,
    app: Option<Application>,
}

impl Scope {
    /// A scope for an HTTP request.
    pub fn http(method: Method, path: impl Into<String>) -> Self {
        Self::new(ScopeKind::Http, method, path.into())
    }

    /// A scope for a long-lived streaming connection.
    pub fn stream(path: impl Into<String>) -> Self {
        Self::new(ScopeKind::Stream, Method::GET, path.into())
    }

    /// The process lifecycle scope.
    pub fn lifecycle() -> Self {
        Self::new(ScopeKind::Lifecycle, Method::GET, String::new())
    }

    fn new(kind: ScopeKind, method: Method, path: String) -> Self {
        Self {
            kind,
            method,
            path,
            headers: Vec::new(),
            params: HashMap::new(),
            app: None,
        }
    }

    /// Attach a request header. Chainable, for transports and tests.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// A named path parameter, filled in by the router on a match.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The application this scope is being dispatched through. `None` until
    /// [`Application::handle`] has seen it.
    pub fn app(&self) -> Option<&Application> {
        self.app.as_ref()
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub(crate) fn attach_app(&mut self, app: Application) {
        self.app = Some(app);
    }
}
