//! Exception middleware: the innermost supervision layer.
//!
//! Translates errors raised by the router and its handlers into responses,
//! using the registered handler table — and nothing more. Errors with no
//! matching handler propagate unchanged; the outermost layer owns those.

use tracing::debug;

use crate::channel::{Receiver, Sender};
use crate::dispatch::{Dispatch, DispatchFuture, Dispatcher};
use crate::error::ResponseStarted;
use crate::handlers::ExceptionHandlers;
use crate::request::Request;
use crate::scope::{Scope, ScopeKind};

/// The innermost wrapper around the router.
///
/// Contract, per connection:
/// - No error: pass through untouched.
/// - A raised error with a matching handler: invoke the handler with the
///   request view and the error, send its response — unless the response
///   already started, in which case wrap in [`ResponseStarted`] and
///   re-raise rather than corrupt the stream.
/// - A raised error with no matching handler: propagate unchanged.
/// - Non-HTTP scope kinds have no response concept; exception handling is
///   skipped entirely and errors propagate unconditionally.
///
/// A handler that itself fails is not caught here: its error propagates to
/// the server-error middleware as fatal.
pub struct ExceptionMiddleware {
    app: Dispatcher,
    handlers: ExceptionHandlers,
    debug: bool,
}

impl ExceptionMiddleware {
    pub fn new(app: Dispatcher, mut handlers: ExceptionHandlers, debug: bool) -> Self {
        handlers.ensure_http_default();
        Self { app, handlers, debug }
    }
}

impl Dispatch for ExceptionMiddleware {
    fn dispatch(&self, scope: Scope, receive: Receiver, send: Sender) -> DispatchFuture {
        if scope.kind() != ScopeKind::Http {
            return self.app.dispatch(scope, receive, send);
        }

        let app = self.app.clone();
        let handlers = self.handlers.clone();
        let debug = self.debug;

        Box::pin(async move {
            let error = match app.dispatch(scope.clone(), receive, send.clone()).await {
                Ok(()) => return Ok(()),
                Err(error) => error,
            };

            let Some(handler) = handlers.lookup(&error) else {
                return Err(error);
            };

            if send.response_started() {
                return Err(ResponseStarted::raise(error));
            }

            if debug {
                debug!(error = ?error, "converting raised error into a response");
            }

            let request = Request::new(scope);
            let response = handler.call(request, error).await?;
            response.send(&send).await?;
            Ok(())
        })
    }
}
