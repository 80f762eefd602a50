//! Drives `switchboard_fetch::handle` against `http::Request` values the
//! way a fetch-style runtime (no actix-web, no bound socket) would.

use http::Request;
use std::sync::Arc;
use switchboard::{task_fn, Server, ServerConfig, TaskOutcome};
use switchboard_fetch::handle;

#[actix_rt::test]
async fn a_literal_route_returns_its_body_and_status() {
    let mut server = Server::new(ServerConfig::new());
    server.get(
        "/ping",
        task_fn(|_req, res, _ctx| {
            Box::pin(async move {
                res.set_html("pong", 200, None);
                Ok(TaskOutcome::Continue)
            })
        }),
        0,
    );
    let server = Arc::new(server);

    let req = Request::builder()
        .method("GET")
        .uri("/ping")
        .body(Vec::new())
        .unwrap();
    let res = handle(server, req).await;

    assert_eq!(res.status(), http::StatusCode::OK);
    assert_eq!(res.body(), b"pong");
}

#[actix_rt::test]
async fn an_unmatched_route_serialises_the_not_found_envelope() {
    let server = Arc::new(Server::new(ServerConfig::new()));

    let req = Request::builder()
        .method("GET")
        .uri("/nowhere")
        .body(Vec::new())
        .unwrap();
    let res = handle(server, req).await;

    assert_eq!(res.status(), http::StatusCode::NOT_FOUND);
    let envelope: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(envelope.get("code").unwrap(), 404);
}

#[actix_rt::test]
async fn a_named_parameter_route_merges_the_captured_segment() {
    let mut server = Server::new(ServerConfig::new());
    server.get(
        "/user/:id",
        task_fn(|req, res, _ctx| {
            Box::pin(async move {
                res.set_json(
                    req.data.get("id").cloned().unwrap_or(serde_json::Value::Null),
                    200,
                    None,
                );
                Ok(TaskOutcome::Continue)
            })
        }),
        0,
    );
    let server = Arc::new(server);

    let req = Request::builder()
        .method("GET")
        .uri("/user/42")
        .body(Vec::new())
        .unwrap();
    let res = handle(server, req).await;

    assert_eq!(res.status(), http::StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body.get("results").unwrap(), "42");
}
