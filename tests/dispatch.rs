//! End-to-end dispatch tests: the full stack, driven through the in-memory
//! test client exactly as a transport would drive it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Method, StatusCode};

use atrium::middleware::from_fn;
use atrium::testing::TestClient;
use atrium::{
    Application, Context, Dispatch, Error, Event, ExceptionHandler, HttpError, Incoming, Request,
    Response, ResponseStarted, Router, Scope, TemplateEngine, Templates,
};

// ── Error types used by the routes under test ─────────────────────────────────

#[derive(Debug)]
struct MissingKey(&'static str);

impl fmt::Display for MissingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing key `{}`", self.0)
    }
}

impl std::error::Error for MissingKey {}

#[derive(Debug)]
struct WorkerCrashed;

impl fmt::Display for WorkerCrashed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("worker crashed")
    }
}

impl std::error::Error for WorkerCrashed {}

// ── Routes ────────────────────────────────────────────────────────────────────

async fn hello(_req: Request) -> Result<Response, HttpError> {
    Ok(Response::text("hi"))
}

async fn lookup(_req: Request) -> Result<Response, MissingKey> {
    Err(MissingKey("user"))
}

async fn crash(_req: Request) -> Result<Response, WorkerCrashed> {
    Err(WorkerCrashed)
}

async fn brew(_req: Request) -> Result<Response, HttpError> {
    Err(HttpError::new(StatusCode::IM_A_TEAPOT))
}

fn bad_key_handler() -> ExceptionHandler {
    ExceptionHandler::sync(|_req, _err| {
        Ok::<_, HttpError>(Response::builder().status(StatusCode::BAD_REQUEST).text("bad key"))
    })
}

// ── Happy path ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn a_route_answers_with_its_response() {
    let app = Application::new(Router::new().get("/hello", hello));
    let outcome = TestClient::new(app).get("/hello").await;

    assert!(outcome.result.is_ok());
    assert_eq!(outcome.status(), Some(StatusCode::OK));
    assert_eq!(outcome.text(), "hi");
    assert_eq!(outcome.header("content-type"), Some("text/plain; charset=utf-8"));
}

#[tokio::test]
async fn the_request_body_reaches_the_handler() {
    async fn echo(mut req: Request) -> Result<Response, Error> {
        let body = req.body().await?;
        Ok(Response::text(String::from_utf8_lossy(&body).into_owned()))
    }

    let app = Application::new(Router::new().post("/echo", echo));
    let outcome = TestClient::new(app)
        .request_with(
            Scope::http(Method::POST, "/echo"),
            vec![
                Incoming::Body { data: Bytes::from_static(b"hel"), more: true },
                Incoming::Body { data: Bytes::from_static(b"lo"), more: false },
            ],
        )
        .await;

    assert_eq!(outcome.text(), "hello");
}

// ── Handled errors ────────────────────────────────────────────────────────────

#[tokio::test]
async fn a_registered_handler_converts_the_error() {
    let app = Application::builder()
        .router(Router::new().get("/lookup", lookup))
        .on_error::<MissingKey>(bad_key_handler())
        .build();

    let outcome = TestClient::new(app).get("/lookup").await;

    // The handler's response, and no error escapes to the caller.
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(outcome.text(), "bad key");
}

#[tokio::test]
async fn a_specific_handler_beats_the_base_entry() {
    let app = Application::builder()
        .router(Router::new().get("/lookup", lookup).get("/crash", crash))
        .on_error::<MissingKey>(bad_key_handler())
        .on_error_family(
            "anything",
            |_| true,
            ExceptionHandler::sync(|_req, err| {
                Ok::<_, HttpError>(
                    Response::builder()
                        .status(StatusCode::SERVICE_UNAVAILABLE)
                        .text(format!("fallback: {err}")),
                )
            }),
        )
        .build();
    let client = TestClient::new(app);

    let specific = client.get("/lookup").await;
    assert_eq!(specific.text(), "bad key");

    // No exact entry for WorkerCrashed: the base entry covers it.
    let base = client.get("/crash").await;
    assert_eq!(base.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(base.text(), "fallback: worker crashed");
}

#[tokio::test]
async fn a_status_handler_matches_raised_http_errors() {
    let app = Application::builder()
        .router(Router::new().get("/brew", brew))
        .on_status(
            StatusCode::IM_A_TEAPOT,
            ExceptionHandler::sync(|_req, _err| {
                Ok::<_, HttpError>(
                    Response::builder().status(StatusCode::IM_A_TEAPOT).text("short and stout"),
                )
            }),
        )
        .build();

    let outcome = TestClient::new(app).get("/brew").await;
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.status(), Some(StatusCode::IM_A_TEAPOT));
    assert_eq!(outcome.text(), "short and stout");
}

#[tokio::test]
async fn route_misses_render_as_404_and_405() {
    let app = Application::new(Router::new().get("/hello", hello));
    let client = TestClient::new(app);

    let missing = client.get("/nope").await;
    assert!(missing.result.is_ok());
    assert_eq!(missing.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(missing.text(), "Not Found");

    let wrong_method = client.request(Scope::http(Method::POST, "/hello")).await;
    assert_eq!(wrong_method.status(), Some(StatusCode::METHOD_NOT_ALLOWED));
}

// ── Unhandled errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn unhandled_errors_produce_a_500_and_re_raise() {
    let app = Application::new(Router::new().get("/crash", crash));
    let outcome = TestClient::new(app).get("/crash").await;

    assert_eq!(outcome.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(outcome.text(), "Internal Server Error");

    // The original error is observably re-raised to the dispatch caller.
    let error = outcome.result.unwrap_err();
    assert!(error.downcast_ref::<WorkerCrashed>().is_some());
}

#[tokio::test]
async fn debug_mode_renders_a_traceback_page() {
    let app = Application::builder()
        .debug(true)
        .router(Router::new().get("/crash", crash))
        .build();
    let outcome = TestClient::new(app).get("/crash").await;

    assert!(outcome.result.is_err());
    assert_eq!(outcome.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(outcome.header("content-type"), Some("text/html; charset=utf-8"));

    let body = outcome.text();
    assert!(body.contains("WorkerCrashed"));
    assert!(body.contains("Traceback"));
}

#[tokio::test]
async fn the_server_error_handler_wins_even_in_debug_mode() {
    let app = Application::builder()
        .debug(true)
        .router(Router::new().get("/crash", crash))
        .on_server_error(ExceptionHandler::sync(|_req, err| {
            Ok::<_, HttpError>(
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .text(format!("sorry: {err}")),
            )
        }))
        .build();
    let outcome = TestClient::new(app).get("/crash").await;

    // Its response is sent AND the error still re-raises.
    assert_eq!(outcome.text(), "sorry: worker crashed");
    assert!(outcome.result.unwrap_err().downcast_ref::<WorkerCrashed>().is_some());
}

#[tokio::test]
async fn errors_after_a_started_response_re_raise_without_doubling() {
    // Middleware starts the response, then the route raises a *handled*
    // error: too late to handle, so it re-raises wrapped.
    let eager = from_fn("eager", |scope, receive, send: atrium::Sender, next| async move {
        send.send(Event::Start { status: StatusCode::OK, headers: Vec::new() }).await?;
        next.dispatch(scope, receive, send).await
    });

    let app = Application::builder()
        .router(Router::new().get("/lookup", lookup))
        .middleware(eager)
        .on_error::<MissingKey>(bad_key_handler())
        .build();
    let outcome = TestClient::new(app).get("/lookup").await;

    let error = outcome.result.unwrap_err();
    let wrapped = error.downcast_ref::<ResponseStarted>().unwrap();
    assert!(wrapped.original().downcast_ref::<MissingKey>().is_some());

    // Exactly one Start event — no second response was attempted.
    let starts = outcome
        .events
        .iter()
        .filter(|e| matches!(e, Event::Start { .. }))
        .count();
    assert_eq!(starts, 1);
}

// ── Middleware composition ────────────────────────────────────────────────────

#[tokio::test]
async fn middleware_runs_in_registration_order() {
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let recorder = |tag_in: &'static str, tag_out: &'static str| {
        let order = order.clone();
        from_fn(tag_in, move |scope, receive, send, next| {
            let order = order.clone();
            async move {
                order.lock().unwrap().push(tag_in);
                let result = next.dispatch(scope, receive, send).await;
                order.lock().unwrap().push(tag_out);
                result
            }
        })
    };

    let app = Application::builder()
        .router(Router::new().get("/hello", hello))
        .middleware(recorder("first:in", "first:out"))
        .middleware(recorder("second:in", "second:out"))
        .build();

    let outcome = TestClient::new(app).get("/hello").await;
    assert!(outcome.result.is_ok());
    assert_eq!(
        *order.lock().unwrap(),
        vec!["first:in", "second:in", "second:out", "first:out"]
    );
}

#[tokio::test]
async fn middleware_can_answer_without_calling_the_next_layer() {
    let gate = from_fn("gate", |_scope, _receive, send: atrium::Sender, _next| async move {
        Response::builder()
            .status(StatusCode::ACCEPTED)
            .text("from middleware")
            .send(&send)
            .await?;
        Ok(())
    });

    let app = Application::builder()
        .router(Router::new().get("/hello", hello))
        .middleware(gate)
        .build();

    let outcome = TestClient::new(app).get("/hello").await;
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.status(), Some(StatusCode::ACCEPTED));
    assert_eq!(outcome.text(), "from middleware");
}

#[tokio::test]
async fn registration_after_the_first_dispatch_fails() {
    let app = Application::new(Router::new().get("/hello", hello));
    let client = TestClient::new(app.clone());

    assert!(client.get("/hello").await.result.is_ok());

    let late = from_fn("late", |scope, receive, send, next: atrium::Dispatcher| async move {
        next.dispatch(scope, receive, send).await
    });
    assert!(matches!(app.add_middleware(late), Err(Error::AlreadyStarted)));
}

#[tokio::test]
async fn the_stack_is_built_exactly_once() {
    let app = Application::new(Router::new().get("/hello", hello));
    let stack = app.start();

    let client = TestClient::new(app.clone());
    client.get("/hello").await;
    client.get("/hello").await;

    assert!(Arc::ptr_eq(&stack, &app.start()));
}

// ── Non-HTTP scopes ───────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_scope_errors_propagate_with_no_response() {
    let app = Application::builder()
        .router(Router::new())
        // Even a match-everything handler is skipped off the HTTP path.
        .on_error_family(
            "anything",
            |_| true,
            ExceptionHandler::sync(|_req, _err| Ok::<_, HttpError>(Response::text("handled"))),
        )
        .build();

    let outcome = TestClient::new(app).request(Scope::stream("/feed")).await;

    let error = outcome.result.unwrap_err();
    assert!(matches!(error.downcast_ref::<Error>(), Some(Error::UnroutableScope)));
    assert!(outcome.events.is_empty());
}

#[tokio::test]
async fn lifecycle_messages_are_acknowledged() {
    let app = Application::new(Router::new());
    let outcome = TestClient::new(app)
        .request_with(Scope::lifecycle(), vec![Incoming::Startup, Incoming::Shutdown])
        .await;

    assert!(outcome.result.is_ok());
    assert_eq!(outcome.events, vec![Event::StartupComplete, Event::ShutdownComplete]);
}

// ── Application-wide facilities ───────────────────────────────────────────────

#[tokio::test]
async fn handlers_reach_the_application_through_the_scope() {
    async fn whoami(req: Request) -> Result<Response, Error> {
        let path = req.url_for("user", &[("id", "7")])?;
        Ok(Response::text(path))
    }

    let app = Application::new(
        Router::new()
            .named("user", Method::GET, "/users/{id}", hello)
            .get("/whoami", whoami),
    );

    let outcome = TestClient::new(app).get("/whoami").await;
    assert_eq!(outcome.text(), "/users/7");
}

#[tokio::test]
async fn state_is_shared_across_dispatches() {
    async fn count(req: Request) -> Result<Response, Error> {
        let hits = req.state()?.get::<AtomicU64>("hits").ok_or(Error::DetachedScope)?;
        let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Response::text(n.to_string()))
    }

    let app = Application::new(Router::new().get("/count", count));
    app.state().insert("hits", AtomicU64::new(0));

    let client = TestClient::new(app);
    assert_eq!(client.get("/count").await.text(), "1");
    assert_eq!(client.get("/count").await.text(), "2");
}

#[tokio::test]
async fn templates_render_with_url_reversal() {
    struct Greeter;

    impl TemplateEngine for Greeter {
        fn render(&self, name: &str, context: &Context) -> Result<String, atrium::DispatchError> {
            assert_eq!(name, "hello.html");
            let who = context.get("name").unwrap_or("world");
            let link = context.url_for("user", &[("id", "7")])?;
            Ok(format!("<h1>Hello {who}</h1><a href=\"{link}\">profile</a>"))
        }
    }

    async fn page(req: Request) -> Result<Response, atrium::DispatchError> {
        let templates = Templates::new(Greeter);
        templates.response(&req, "hello.html", Context::new().with("name", "alice"))
    }

    let app = Application::new(
        Router::new()
            .named("user", Method::GET, "/users/{id}", hello)
            .get("/", page),
    );

    let outcome = TestClient::new(app).get("/").await;
    assert_eq!(outcome.header("content-type"), Some("text/html; charset=utf-8"));
    assert!(outcome.text().contains("Hello alice"));
    assert!(outcome.text().contains("/users/7"));
}
