//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup via [`matchit`], plus a
//! name → template table for URL reversal. The router is the innermost
//! dispatchable: a miss raises [`HttpError`] 404 (405 when the path exists
//! under another method) and lets the exception machinery render it.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::channel::{Event, Incoming, Receiver, Sender};
use crate::dispatch::{Dispatch, DispatchFuture};
use crate::error::{DispatchError, Error, HttpError};
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::scope::{Scope, ScopeKind};

/// The application router.
///
/// One radix tree per HTTP method — no allocations on the hot path. Build
/// it once, hand it to [`Application`](crate::Application). Each
/// registration returns `self` so routes chain naturally.
///
/// Path parameters use `{name}` syntax — `req.param("name")` retrieves
/// them:
///
/// ```rust,no_run
/// use atrium::{Request, Response, Router};
/// use http::Method;
/// # async fn get_user(_: Request) -> Result<Response, atrium::HttpError> { Ok(Response::text("")) }
/// # async fn create_user(_: Request) -> Result<Response, atrium::HttpError> { Ok(Response::text("")) }
///
/// Router::new()
///     .named("user", Method::GET, "/users/{id}", get_user)
///     .post("/users", create_user);
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    names: HashMap<String, String>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), names: HashMap::new() }
    }

    /// Register a handler for a method + path pair. Returns `self` for
    /// chaining.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, None, handler)
    }

    /// Register a *named* route: reversible through
    /// [`url_path_for`](Self::url_path_for) and `Request::url_for`.
    pub fn named(self, name: &str, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, Some(name), handler)
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    fn add(mut self, method: Method, path: &str, name: Option<&str>, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        if let Some(name) = name {
            self.names.insert(name.to_owned(), path.to_owned());
        }
        self
    }

    /// Reverses a named route into a concrete path. Pure lookup.
    ///
    /// Errors on an unknown name, a missing parameter, and a parameter the
    /// template does not take.
    pub fn url_path_for(&self, name: &str, params: &[(&str, &str)]) -> Result<String, Error> {
        let template = self
            .names
            .get(name)
            .ok_or_else(|| Error::UnknownRoute(name.to_owned()))?;

        let mut path = template.clone();
        for (key, value) in params {
            let token = format!("{{{key}}}");
            if !path.contains(&token) {
                return Err(Error::UnknownParam {
                    name: name.to_owned(),
                    param: (*key).to_owned(),
                });
            }
            path = path.replace(&token, value);
        }
        if let Some(start) = path.find('{') {
            let end = path[start..].find('}').map_or(path.len(), |e| start + e);
            return Err(Error::MissingParam {
                name: name.to_owned(),
                param: path[start + 1..end].to_owned(),
            });
        }
        Ok(path)
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Whether any *other* method tree matches this path — the 405 case.
    fn other_method_matches(&self, method: &Method, path: &str) -> bool {
        self.routes
            .iter()
            .any(|(m, tree)| m != method && tree.at(path).is_ok())
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatch for Router {
    fn dispatch(&self, mut scope: Scope, receive: Receiver, send: Sender) -> DispatchFuture {
        match scope.kind() {
            ScopeKind::Lifecycle => Box::pin(lifecycle(receive, send)),
            // Streams have no routing table here; protocol framing is the
            // transport's business. Raise, unconditionally.
            ScopeKind::Stream => Box::pin(async { Err(Error::UnroutableScope.into()) }),
            ScopeKind::Http => match self.lookup(scope.method(), scope.path()) {
                Some((handler, params)) => {
                    scope.set_params(params);
                    Box::pin(async move {
                        let request = Request::with_body(scope, receive);
                        let response = handler.call(request).await?;
                        response.send(&send).await?;
                        Ok(())
                    })
                }
                None => {
                    let status = if self.other_method_matches(scope.method(), scope.path()) {
                        StatusCode::METHOD_NOT_ALLOWED
                    } else {
                        StatusCode::NOT_FOUND
                    };
                    Box::pin(async move { Err(HttpError::new(status).into()) })
                }
            },
        }
    }
}

/// Acknowledges the host's lifecycle protocol: `Startup` →
/// `StartupComplete`, `Shutdown` → `ShutdownComplete`, then done.
async fn lifecycle(mut receive: Receiver, send: Sender) -> Result<(), DispatchError> {
    while let Some(message) = receive.recv().await {
        match message {
            Incoming::Startup => send.send(Event::StartupComplete).await?,
            Incoming::Shutdown => {
                send.send(Event::ShutdownComplete).await?;
                return Ok(());
            }
            Incoming::Body { .. } | Incoming::Disconnect => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Response;

    async fn hello(_req: Request) -> Result<Response, HttpError> {
        Ok(Response::text("hi"))
    }

    fn sample() -> Router {
        Router::new()
            .named("user", Method::GET, "/users/{id}", hello)
            .post("/users", hello)
    }

    #[test]
    fn lookup_extracts_params() {
        let router = sample();
        let (_, params) = router.lookup(&Method::GET, "/users/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(router.lookup(&Method::GET, "/missing").is_none());
    }

    #[test]
    fn other_method_detection() {
        let router = sample();
        assert!(router.other_method_matches(&Method::DELETE, "/users"));
        assert!(!router.other_method_matches(&Method::DELETE, "/missing"));
    }

    #[test]
    fn url_path_for_fills_params() {
        let router = sample();
        assert_eq!(router.url_path_for("user", &[("id", "42")]).unwrap(), "/users/42");
    }

    #[test]
    fn url_path_for_rejects_unknown_names_and_params() {
        let router = sample();
        assert!(matches!(
            router.url_path_for("nope", &[]),
            Err(Error::UnknownRoute(_))
        ));
        assert!(matches!(
            router.url_path_for("user", &[("id", "42"), ("extra", "x")]),
            Err(Error::UnknownParam { .. })
        ));
        assert!(matches!(
            router.url_path_for("user", &[]),
            Err(Error::MissingParam { .. })
        ));
    }
}
