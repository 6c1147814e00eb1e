//! Server error middleware: the outermost supervision layer.
//!
//! Last line of defense. Whatever escapes the rest of the stack — user
//! middleware included — this layer guarantees the transport still receives
//! a terminal response, then re-raises the error to the host. It never
//! swallows anything.

use std::backtrace::Backtrace;

use http::StatusCode;
use tracing::{error, warn};

use crate::channel::{Receiver, Sender};
use crate::dispatch::{Dispatch, DispatchFuture, Dispatcher};
use crate::error::DispatchError;
use crate::handlers::ExceptionHandler;
use crate::request::Request;
use crate::response::Response;
use crate::scope::{Scope, ScopeKind};

/// The outermost wrapper of every application stack.
///
/// On an uncaught error, exactly one of three responses is attempted, in
/// this order of precedence:
///
/// 1. the configured error handler's response, when one is registered;
/// 2. the debug diagnostic page, when no handler is registered and `debug`
///    is on;
/// 3. the plain-text `500 Internal Server Error` default.
///
/// The handler wins over debug rendering whenever both are available. After
/// the attempt — and also when the response had already started and nothing
/// more can be sent — the original error is re-raised for host-level
/// logging. Non-HTTP scopes pass through untouched.
pub struct ServerErrorMiddleware {
    app: Dispatcher,
    handler: Option<ExceptionHandler>,
    debug: bool,
}

impl ServerErrorMiddleware {
    pub fn new(app: Dispatcher, handler: Option<ExceptionHandler>, debug: bool) -> Self {
        Self { app, handler, debug }
    }
}

impl Dispatch for ServerErrorMiddleware {
    fn dispatch(&self, scope: Scope, receive: Receiver, send: Sender) -> DispatchFuture {
        if scope.kind() != ScopeKind::Http {
            return self.app.dispatch(scope, receive, send);
        }

        let app = self.app.clone();
        let handler = self.handler.clone();
        let debug = self.debug;

        Box::pin(async move {
            let error = match app.dispatch(scope.clone(), receive, send.clone()).await {
                Ok(()) => return Ok(()),
                Err(error) => error,
            };

            error!(%error, path = scope.path(), "unhandled application error");

            if !send.response_started() {
                let response = match &handler {
                    Some(handler) => {
                        let request = Request::new(scope);
                        match handler.call(request, error.clone()).await {
                            Ok(response) => response,
                            Err(handler_error) => {
                                // The configured handler is itself broken;
                                // the transport still gets a terminal
                                // response and the original error re-raises.
                                warn!(%handler_error, "error handler failed");
                                plain_error_response()
                            }
                        }
                    }
                    None if debug => debug_response(&error),
                    None => plain_error_response(),
                };
                if let Err(send_error) = response.send(&send).await {
                    warn!(%send_error, "could not deliver error response");
                }
            }

            Err(error)
        })
    }
}

/// The non-debug default: what clients see when nothing else is configured.
fn plain_error_response() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .text("Internal Server Error")
}

/// The debug diagnostic page: error message, its `Debug` form (which names
/// the concrete type), and a captured backtrace. Never shown unless the
/// application was built with `debug(true)` — it leaks internals by design
/// of the flag.
fn debug_response(error: &DispatchError) -> Response {
    let backtrace = Backtrace::force_capture();
    let body = format!(
        "<html>\n<head><title>atrium: 500 Internal Server Error</title></head>\n\
         <body>\n<h1>500 Internal Server Error</h1>\n\
         <p>{message}</p>\n\
         <h2>Error</h2>\n<pre>{detail}</pre>\n\
         <h2>Traceback</h2>\n<pre>{trace}</pre>\n</body>\n</html>\n",
        message = escape(&error.to_string()),
        detail = escape(&format!("{error:?}")),
        trace = escape(&backtrace.to_string()),
    );
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .html(body)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
