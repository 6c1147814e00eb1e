//! Incoming request view.

use bytes::{Bytes, BytesMut};
use http::Method;

use crate::app::Application;
use crate::channel::{Incoming, Receiver};
use crate::error::Error;
use crate::scope::Scope;
use crate::state::State;

/// A request-shaped view over a connection scope.
///
/// Route handlers receive one with the body channel attached; exception
/// handlers receive one without it (by the time an error is being handled,
/// the body channel has already been consumed — [`Request::body`] then
/// yields empty bytes).
pub struct Request {
    scope: Scope,
    receive: Option<Receiver>,
}

impl Request {
    pub(crate) fn new(scope: Scope) -> Self {
        Self { scope, receive: None }
    }

    pub(crate) fn with_body(scope: Scope, receive: Receiver) -> Self {
        Self { scope, receive: Some(receive) }
    }

    pub fn method(&self) -> &Method {
        self.scope.method()
    }

    pub fn path(&self) -> &str {
        self.scope.path()
    }

    pub fn headers(&self) -> &[(String, String)] {
        self.scope.headers()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.scope
            .headers()
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns
    /// `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.scope.param(key)
    }

    /// The application dispatching this request.
    pub fn app(&self) -> Option<&Application> {
        self.scope.app()
    }

    /// The application's shared state bag.
    pub fn state(&self) -> Result<&State, Error> {
        self.app().map(Application::state).ok_or(Error::DetachedScope)
    }

    /// Reverses a named route, e.g. `req.url_for("user", &[("id", "42")])`.
    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Result<String, Error> {
        self.app()
            .ok_or(Error::DetachedScope)?
            .url_path_for(name, params)
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Collects the request body from the inbound channel.
    ///
    /// Suspends cooperatively until the terminal chunk arrives. Fails with
    /// [`Error::ChannelClosed`] if the client disconnects mid-body.
    pub async fn body(&mut self) -> Result<Bytes, Error> {
        let Some(receive) = self.receive.as_mut() else {
            return Ok(Bytes::new());
        };
        let mut buf = BytesMut::new();
        while let Some(message) = receive.recv().await {
            match message {
                Incoming::Body { data, more } => {
                    buf.extend_from_slice(&data);
                    if !more {
                        break;
                    }
                }
                Incoming::Disconnect => return Err(Error::ChannelClosed),
                // Lifecycle messages never appear on request scopes.
                Incoming::Startup | Incoming::Shutdown => {}
            }
        }
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::receive_channel;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let scope = Scope::http(Method::GET, "/").header("X-Token", "abc");
        let request = Request::new(scope);
        assert_eq!(request.header("x-token"), Some("abc"));
        assert_eq!(request.header("missing"), None);
    }

    #[tokio::test]
    async fn body_concatenates_chunks_until_terminal() {
        let (tx, rx) = receive_channel();
        tx.send(Incoming::Body { data: Bytes::from_static(b"hel"), more: true }).unwrap();
        tx.send(Incoming::Body { data: Bytes::from_static(b"lo"), more: false }).unwrap();

        let mut request = Request::with_body(Scope::http(Method::POST, "/"), rx);
        assert_eq!(request.body().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn body_without_a_channel_is_empty() {
        let mut request = Request::new(Scope::http(Method::GET, "/"));
        assert_eq!(request.body().await.unwrap(), Bytes::new());
    }

    #[tokio::test]
    async fn disconnect_mid_body_errors() {
        let (tx, rx) = receive_channel();
        tx.send(Incoming::Body { data: Bytes::from_static(b"par"), more: true }).unwrap();
        tx.send(Incoming::Disconnect).unwrap();

        let mut request = Request::with_body(Scope::http(Method::POST, "/"), rx);
        assert!(matches!(request.body().await, Err(Error::ChannelClosed)));
    }
}
