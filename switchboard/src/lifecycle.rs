//! The stateless `request -> route -> response` orchestrator wrapping a
//! single route invocation.
//!

use crate::error::Error;
use crate::queue::PriorityQueue;
use crate::request::{Body, Request};
use crate::response::Response;
use crate::server::Server;
use crate::status::Status;

/// What a phase tells its caller: keep going, or the lifecycle is done
/// (either because a task aborted or because an error was already
/// turned into a Response and re-emitted as `"error"`).
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PhaseOutcome {
    Continue,
    Stop,
}

/// Runs `PREPARE -> PROCESS -> SHUTDOWN` for one `(Request, Response)`
/// pair, wrapping every phase in the same error-interception shim.
///
/// `PREPARE` and `SHUTDOWN` emit the literal `"request"`/`"response"`
/// events; `PROCESS` runs a queue the caller has already built for the
/// route or event in question (see
/// [`Server::call`](crate::server::Server::call)), since building that
/// queue requires knowing whether the event is route-shaped (with
/// `params` to merge) or a plain custom event.
///
pub struct RouteLifecycle<'a> {
    server: &'a Server,
    route_event: String,
    process_queue: PriorityQueue,
}

impl<'a> RouteLifecycle<'a> {
    pub fn new(server: &'a Server, route_event: String, process_queue: PriorityQueue) -> Self {
        Self {
            server,
            route_event,
            process_queue,
        }
    }

    /// Drive the full lifecycle. Always returns -- errors and aborts are
    /// absorbed into the Response, never propagated to the caller; by
    /// the time this returns, `res` is ready for `dispatch`.
    ///
    #[tracing::instrument(
        skip(self, req, res),
        fields(method = %req.method, path = %req.url.path(), event = %self.route_event)
    )]
    pub async fn run(&self, req: &mut Request, res: &mut Response) {
        tracing::debug!("entering PREPARE phase");
        if self.emit_literal("request", req, res).await == PhaseOutcome::Stop {
            return;
        }

        tracing::debug!("entering PROCESS phase");
        if self.run_process(req, res).await == PhaseOutcome::Stop {
            return;
        }

        if matches!(res.body, Body::Null) && res.code == 0 {
            let err = Error::route_not_found(&self.route_event);
            self.upgrade_and_emit_error(&err, req, res).await;
            return;
        }
        if res.code == 0 {
            res.set_status(200, None);
        }

        tracing::debug!("entering SHUTDOWN phase");
        self.emit_literal("response", req, res).await;
        tracing::info!(code = res.code, "dispatch complete");
    }

    async fn run_process(&self, req: &mut Request, res: &mut Response) -> PhaseOutcome {
        match self.process_queue.run(req, res, self.server).await {
            Ok(Status::Abort) => PhaseOutcome::Stop,
            Ok(_) => PhaseOutcome::Continue,
            Err(err) => {
                self.upgrade_and_emit_error(&err, req, res).await;
                PhaseOutcome::Stop
            }
        }
    }

    async fn emit_literal(
        &self,
        event: &str,
        req: &mut Request,
        res: &mut Response,
    ) -> PhaseOutcome {
        let queue = self.server.tasks(event);
        match queue.run(req, res, self.server).await {
            Ok(Status::Abort) => PhaseOutcome::Stop,
            Ok(_) => PhaseOutcome::Continue,
            Err(err) => {
                self.upgrade_and_emit_error(&err, req, res).await;
                PhaseOutcome::Stop
            }
        }
    }

    /// Populate `res` from `err` and re-emit `"error"`. Errors raised by
    /// the `"error"` listeners themselves are not caught again -- a
    /// second failure there is a bug in the application's error handler,
    /// not something the lifecycle can recover from.
    ///
    async fn upgrade_and_emit_error(&self, err: &Error, req: &mut Request, res: &mut Response) {
        tracing::warn!(error = %err, "lifecycle upgrading error into response");
        let (code, status, message, errors) = err.to_response_parts();
        res.code = code;
        res.status = Some(status.to_string());
        if !message.is_empty() {
            res.error = Some(message);
        }
        for (key, value) in errors {
            res.errors.insert(key, value);
        }
        res.stack = err.stack();

        let queue = self.server.tasks("error");
        let _ = queue.run(req, res, self.server).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::task::{task_fn, TaskOutcome};
    use serde_json::Value;

    #[actix_rt::test]
    async fn literal_route_responds_ok() {
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

        let mut req = Request::new();
        let mut res = Response::new();
        let queue = server.tasks_for_request("GET", "/ping");
        let lifecycle = RouteLifecycle::new(&server, "GET /ping".to_string(), queue);
        lifecycle.run(&mut req, &mut res).await;

        assert_eq!(res.code, 200);
        assert_eq!(res.status.as_deref(), Some("OK"));
    }

    #[actix_rt::test]
    async fn named_parameter_is_merged_into_data_before_process_runs() {
        let mut server = Server::new(ServerConfig::new());
        server.get(
            "/user/:id",
            task_fn(|req, res, _ctx| {
                Box::pin(async move {
                    let id = req.data.get("id").cloned().unwrap_or(Value::Null);
                    res.set_json(id, 200, None);
                    Ok(TaskOutcome::Continue)
                })
            }),
            0,
        );

        let mut req = Request::new();
        req.url = url::Url::parse("http://unknownhost/user/42").unwrap();
        let mut res = Response::new();
        let queue = server.tasks_for_request("GET", "/user/42");
        let lifecycle = RouteLifecycle::new(&server, "GET /user/42".to_string(), queue);
        lifecycle.run(&mut req, &mut res).await;

        assert_eq!(req.data.get("id").unwrap(), "42");
        assert_eq!(res.code, 200);
    }

    #[actix_rt::test]
    async fn an_error_handler_produces_its_own_body() {
        let mut server = Server::new(ServerConfig::new());
        server.get(
            "/boom",
            task_fn(|_req, _res, _ctx| {
                Box::pin(async move { Err(Error::handler_exception("kaboom")) })
            }),
            0,
        );
        server.on(
            &[crate::pattern::EventKey::Literal("error")],
            task_fn(|_req, res, _ctx| {
                Box::pin(async move {
                    res.add_header("X-Handled", "error");
                    Ok(TaskOutcome::Continue)
                })
            }),
            0,
        );

        let mut req = Request::new();
        let mut res = Response::new();
        let queue = server.tasks_for_request("GET", "/boom");
        let lifecycle = RouteLifecycle::new(&server, "GET /boom".to_string(), queue);
        lifecycle.run(&mut req, &mut res).await;

        assert_eq!(res.code, 500);
        assert_eq!(res.error.as_deref(), Some("kaboom"));
        assert!(res.headers.iter().any(|(k, v)| k == "X-Handled" && v == "error"));
    }

    #[actix_rt::test]
    async fn unmatched_route_synthesises_not_found() {
        let server = Server::new(ServerConfig::new());
        let mut req = Request::new();
        let mut res = Response::new();
        let queue = server.tasks_for_request("GET", "/nowhere");
        let lifecycle = RouteLifecycle::new(&server, "GET /nowhere".to_string(), queue);
        lifecycle.run(&mut req, &mut res).await;

        assert_eq!(res.code, 404);
        assert_eq!(res.status.as_deref(), Some("Not Found"));
    }

    #[actix_rt::test]
    async fn abort_during_process_skips_response_phase() {
        let mut server = Server::new(ServerConfig::new());
        server.get(
            "/stop",
            task_fn(|_req, _res, _ctx| Box::pin(async move { Ok(TaskOutcome::Abort) })),
            0,
        );
        server.on(
            &[crate::pattern::EventKey::Literal("response")],
            task_fn(|_req, res, _ctx| {
                Box::pin(async move {
                    res.add_header("X-Response-Phase", "ran");
                    Ok(TaskOutcome::Continue)
                })
            }),
            0,
        );

        let mut req = Request::new();
        let mut res = Response::new();
        let queue = server.tasks_for_request("GET", "/stop");
        let lifecycle = RouteLifecycle::new(&server, "GET /stop".to_string(), queue);
        lifecycle.run(&mut req, &mut res).await;

        assert_eq!(res.code, 0);
        assert!(!res.headers.iter().any(|(k, _)| k == "X-Response-Phase"));
    }
}
