//! In-memory test client.
//!
//! Drives an [`Application`] through its real dispatch entry point — scope,
//! channels and all — without a transport. The same harness the crate's own
//! integration tests use.
//!
//! ```rust
//! use atrium::testing::TestClient;
//! use atrium::{Application, Request, Response, Router};
//!
//! async fn hello(_req: Request) -> Result<Response, atrium::HttpError> {
//!     Ok(Response::text("hi"))
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let app = Application::new(Router::new().get("/hello", hello));
//! let client = TestClient::new(app);
//!
//! let outcome = client.get("/hello").await;
//! assert_eq!(outcome.status().unwrap().as_u16(), 200);
//! assert_eq!(outcome.text(), "hi");
//! # });
//! ```

use bytes::{Bytes, BytesMut};
use http::{Method, StatusCode};

use crate::app::Application;
use crate::channel::{EVENT_BUFFER, Event, Incoming, receive_channel, send_channel};
use crate::error::DispatchError;
use crate::scope::Scope;

/// An in-memory client for one application.
#[derive(Clone)]
pub struct TestClient {
    app: Application,
}

impl TestClient {
    pub fn new(app: Application) -> Self {
        Self { app }
    }

    /// Dispatches `GET path` with no body.
    pub async fn get(&self, path: &str) -> TestOutcome {
        self.request(Scope::http(Method::GET, path)).await
    }

    /// Dispatches an arbitrary scope with no inbound messages.
    pub async fn request(&self, scope: Scope) -> TestOutcome {
        self.request_with(scope, Vec::new()).await
    }

    /// Dispatches a scope with a preloaded inbound message sequence —
    /// body chunks for HTTP scopes, lifecycle messages for the lifecycle
    /// scope.
    pub async fn request_with(&self, scope: Scope, messages: Vec<Incoming>) -> TestOutcome {
        let (inbound, receiver) = receive_channel();
        for message in messages {
            let _ = inbound.send(message);
        }
        drop(inbound);

        let (sender, mut events_rx) = send_channel(EVENT_BUFFER);
        let dispatch = self.app.handle(scope, receiver, sender);
        let collect = async {
            let mut events = Vec::new();
            while let Some(event) = events_rx.recv().await {
                events.push(event);
            }
            events
        };

        let (result, events) = tokio::join!(dispatch, collect);
        TestOutcome { result, events }
    }
}

/// Everything one dispatch produced: the re-raised error (if any) and the
/// events the transport would have received.
pub struct TestOutcome {
    /// What `Application::handle` returned — `Err` is the re-raised error.
    pub result: Result<(), DispatchError>,
    /// Every event sent to the transport, in order.
    pub events: Vec<Event>,
}

impl TestOutcome {
    /// The response status, if a response started.
    pub fn status(&self) -> Option<StatusCode> {
        self.events.iter().find_map(|event| match event {
            Event::Start { status, .. } => Some(*status),
            _ => None,
        })
    }

    /// A response header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.events.iter().find_map(|event| match event {
            Event::Start { headers, .. } => headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            _ => None,
        })
    }

    /// The concatenated response body.
    pub fn body(&self) -> Bytes {
        let mut buf = BytesMut::new();
        for event in &self.events {
            if let Event::Body { data, .. } = event {
                buf.extend_from_slice(data);
            }
        }
        buf.freeze()
    }

    /// The response body as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body()).into_owned()
    }
}
