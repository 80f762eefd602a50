//! End-to-end lifecycle coverage, driving a `Server` the way an adapter
//! would rather than exercising one module in isolation (see each
//! module's own `#[cfg(test)]` unit tests for the narrower per-component
//! behaviour).

use serde_json::{json, Value};
use switchboard::{
    task_fn, EventKey, Plugin, PluginLoader, Request, Response, Server, ServerConfig, TaskOutcome,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

#[actix_rt::test]
async fn literal_get_responds_with_the_tasks_body() {
    init_tracing();
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
    server.dispatch(&mut req, &mut res).await;

    assert_eq!(res.code, 200);
    assert_eq!(res.status.as_deref(), Some("OK"));
}

#[actix_rt::test]
async fn named_parameter_is_available_to_the_handler_exactly_once() {
    let mut server = Server::new(ServerConfig::new());
    let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counted = calls.clone();
    server.get(
        "/user/:id",
        task_fn(move |req, res, _ctx| {
            let counted = counted.clone();
            Box::pin(async move {
                counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                res.set_json(
                    req.data.get("id").cloned().unwrap_or(Value::Null),
                    200,
                    None,
                );
                Ok(TaskOutcome::Continue)
            })
        }),
        0,
    );

    let mut req = Request::new();
    req.url = url::Url::parse("http://unknownhost/user/42").unwrap();
    let mut res = Response::new();
    server.dispatch(&mut req, &mut res).await;

    assert_eq!(req.data.get("id").unwrap(), "42");
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[actix_rt::test]
async fn priority_order_honours_ties_and_abort_short_circuits() {
    let mut server = Server::new(ServerConfig::new());
    let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

    for priority in [0, 5, -1] {
        let order = order.clone();
        server.on(
            &[EventKey::Literal("work")],
            task_fn(move |_req, _res, _ctx| {
                let order = order.clone();
                Box::pin(async move {
                    order.lock().unwrap().push(priority);
                    if priority == 5 {
                        return Ok(TaskOutcome::Abort);
                    }
                    Ok(TaskOutcome::Continue)
                })
            }),
            priority,
        );
    }

    let mut req = Request::new();
    let mut res = Response::new();
    let queue = server.tasks_for_trigger("work");
    let status = queue.run(&mut req, &mut res, &server).await.unwrap();

    assert_eq!(*order.lock().unwrap(), vec![5]);
    assert_eq!(status, switchboard::Status::Abort);
}

#[actix_rt::test]
async fn a_thrown_error_is_upgraded_and_replayed_through_a_custom_error_listener() {
    let mut server = Server::new(ServerConfig::new());
    server.get(
        "/boom",
        task_fn(|_req, _res, _ctx| {
            Box::pin(async move { Err(switchboard::Error::handler_exception("kaboom")) })
        }),
        0,
    );
    server.on(
        &[EventKey::Literal("error")],
        task_fn(|_req, res, _ctx| {
            Box::pin(async move {
                res.set_json(json!({ "code": 500 }), 500, Some("Internal Error".to_string()));
                Ok(TaskOutcome::Continue)
            })
        }),
        0,
    );

    let mut req = Request::new();
    req.method = "GET".to_string();
    req.url = url::Url::parse("http://unknownhost/boom").unwrap();
    let mut res = Response::new();
    server.dispatch(&mut req, &mut res).await;

    assert_eq!(res.code, 500);
    assert_eq!(res.status.as_deref(), Some("Internal Error"));
    assert_eq!(res.envelope().get("code").unwrap(), 500);
}

#[actix_rt::test]
async fn an_unmatched_route_synthesises_not_found() {
    let server = Server::new(ServerConfig::new());
    let mut req = Request::new();
    req.url = url::Url::parse("http://unknownhost/nowhere").unwrap();
    let mut res = Response::new();
    server.dispatch(&mut req, &mut res).await;

    assert_eq!(res.code, 404);
    assert_eq!(res.status.as_deref(), Some("Not Found"));
}

#[test]
fn plugin_recursion_invokes_the_bootstrap_callback_once_per_leaf() {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use switchboard::{Fs, FsIf};

    #[derive(Default)]
    struct MemFs {
        files: Mutex<HashMap<PathBuf, String>>,
    }

    impl Fs for MemFs {
        fn exists(&self, path: &Path) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }
        fn is_dir(&self, _path: &Path) -> bool {
            false
        }
        fn read(&self, path: &Path) -> std::io::Result<String> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
        }
        fn realpath(&self, path: &Path) -> std::io::Result<PathBuf> {
            Ok(path.to_path_buf())
        }
        fn write(&self, path: &Path, contents: &str) -> std::io::Result<()> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), contents.to_string());
            Ok(())
        }
    }

    let mut files = HashMap::new();
    files.insert(PathBuf::from("/a.js"), r#"["b.js"]"#.to_string());
    files.insert(PathBuf::from("/b.js"), r#"{"k": 1}"#.to_string());
    let fs = std::sync::Arc::new(MemFs {
        files: Mutex::new(files),
    });

    let mut config = ServerConfig::new();
    config.cwd = PathBuf::from("/");
    config.fs = FsIf::new(fs);
    config.plugins = Some(vec!["a.js".to_string()]);
    let mut loader = PluginLoader::new(&config);

    let mut seen = Vec::new();
    loader
        .bootstrap(&mut |name, value| seen.push((name, value)))
        .unwrap();

    assert_eq!(seen, vec![("b".to_string(), json!({"k": 1}))]);
}

#[actix_rt::test]
async fn bootstrap_configurator_plugins_run_before_dispatch() {
    let mut server = Server::new(ServerConfig::new());
    server.plugin(
        "router-setup",
        Plugin::Configurator(std::sync::Arc::new(|server| {
            server.get(
                "/late",
                task_fn(|_req, res, _ctx| {
                    Box::pin(async move {
                        res.set_html("late-bound", 200, None);
                        Ok(TaskOutcome::Continue)
                    })
                }),
                0,
            );
            None
        })),
    );
    server.bootstrap().unwrap();

    let mut req = Request::new();
    req.url = url::Url::parse("http://unknownhost/late").unwrap();
    let mut res = Response::new();
    server.dispatch(&mut req, &mut res).await;

    assert_eq!(res.code, 200);
}
