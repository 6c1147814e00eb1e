//! Minimal atrium example — one app, driven in memory the way a transport
//! would drive it.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic

use atrium::middleware::from_fn;
use atrium::testing::TestClient;
use atrium::{Application, Dispatch, ExceptionHandler, HttpError, Request, Response, Router};
use http::StatusCode;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let router = Router::new()
        .named("user", http::Method::GET, "/users/{id}", get_user)
        .get("/brew", brew);

    let app = Application::builder()
        .router(router)
        .middleware(from_fn("trace", |scope, receive, send, next| async move {
            tracing::info!(method = %scope.method(), path = scope.path(), "dispatch");
            next.dispatch(scope, receive, send).await
        }))
        .on_status(
            StatusCode::IM_A_TEAPOT,
            ExceptionHandler::sync(|_req, _err| {
                Ok::<_, HttpError>(
                    Response::builder().status(StatusCode::IM_A_TEAPOT).text("short and stout"),
                )
            }),
        )
        .build();

    let client = TestClient::new(app);

    for path in ["/users/42", "/brew", "/nope"] {
        let outcome = client.get(path).await;
        println!(
            "GET {path} -> {} {:?}",
            outcome.status().map_or(0, |s| s.as_u16()),
            outcome.text(),
        );
    }
}

// GET /users/{id}
//
// Response::json takes bytes — pass them from your serialiser:
//   serde_json:  Response::json(serde_json::to_vec(&user).unwrap())
//   hand-built:  Response::json(format!(...).into_bytes())  ← zero-cost, no copy
async fn get_user(req: Request) -> Result<Response, HttpError> {
    let id = req.param("id").unwrap_or("unknown");
    Ok(Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#).into_bytes()))
}

// GET /brew → raises 418; the registered status handler renders it.
async fn brew(_req: Request) -> Result<Response, HttpError> {
    Err(HttpError::new(StatusCode::IM_A_TEAPOT))
}
