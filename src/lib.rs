//! # atrium
//!
//! A minimal application kernel for async Rust services: middleware
//! composition and exception dispatch. Nothing more. Nothing less.
//!
//! ## The contract
//!
//! The transport owns the sockets — accepting connections, parsing HTTP,
//! backpressure, shutdown. atrium owns what happens between "a connection
//! scope arrived" and "a terminal response was sent": composing the
//! middleware stack, routing, and turning errors into responses. The
//! transport does transport things. The kernel does kernel things.
//!
//! What atrium guarantees on every HTTP dispatch:
//!
//! - **One stack, built once** — middleware is declared up front; the chain
//!   is frozen at the first dispatch and shared by every concurrent one.
//!   Late registration is an error, not a surprise.
//! - **Two supervision tiers** — registered exception handlers convert
//!   errors they recognise into responses (innermost); anything else still
//!   produces a terminal 500 before the error re-raises to the host
//!   (outermost). Nothing is ever silently swallowed.
//! - **No double-send** — once a response has started, error handling
//!   re-raises instead of corrupting the stream.
//!
//! ## Quick start
//!
//! ```rust
//! use atrium::{Application, ExceptionHandler, HttpError, Request, Response, Router};
//! use http::StatusCode;
//!
//! async fn hello(_req: Request) -> Result<Response, HttpError> {
//!     Ok(Response::text("hi"))
//! }
//!
//! async fn teapot(_req: Request) -> Result<Response, HttpError> {
//!     Err(HttpError::new(StatusCode::IM_A_TEAPOT))
//! }
//!
//! let app = Application::builder()
//!     .router(Router::new().get("/hello", hello).get("/brew", teapot))
//!     .on_status(
//!         StatusCode::IM_A_TEAPOT,
//!         ExceptionHandler::sync(|_req, _err| {
//!             Ok::<_, HttpError>(Response::text("short and stout"))
//!         }),
//!     )
//!     .build();
//! # let _ = app;
//! ```
//!
//! The transport side drives the kernel through
//! [`Application::handle`]`(scope, receive, send)` — one call per inbound
//! connection. In tests, [`testing::TestClient`] is that transport.

mod app;
mod channel;
mod dispatch;
mod error;
mod handler;
mod handlers;
mod request;
mod response;
mod router;
mod scope;
mod state;
mod templating;

pub mod middleware;
pub mod testing;

pub use app::{AppBuilder, Application};
pub use channel::{EVENT_BUFFER, Event, Incoming, Receiver, Sender, receive_channel, send_channel};
pub use dispatch::{Dispatch, DispatchFn, DispatchFuture, Dispatcher, from_fn};
pub use error::{DispatchError, Error, HttpError, ResponseStarted};
pub use handler::Handler;
pub use handlers::{ErrorRef, ExceptionHandler, ExceptionHandlers, ResponseFuture};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use scope::{Scope, ScopeKind};
pub use state::State;
pub use templating::{Context, TemplateEngine, Templates};
