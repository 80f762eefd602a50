//! Holds configuration, registered plugins, and the listener tables built
//! up by [`Router`]; emits the three-phase lifecycle around a route
//! invocation.
//!

use crate::config::ServerConfig;
use crate::error::{Error, StackFrame};
use crate::lifecycle::RouteLifecycle;
use crate::loader::PluginLoader;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::task::TaskOutcome;
use serde_json::{Map, Value};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A declared plugin, registered programmatically before `bootstrap`
/// runs. File-discovered plugins (via `config.plugins`/`config.modules`)
/// are always [`Plugin::Config`], since a descriptor read off disk is
/// data, never a callable; `Configurator` is how an application wires up
/// a plugin that needs to touch the `Server` itself (e.g. to register
/// routes) before its config value is known.
///
#[derive(Clone)]
pub enum Plugin {
    /// `(server) -> config-object-or-void`.
    Configurator(Arc<dyn Fn(&mut Server) -> Option<Value> + Send + Sync>),
    /// Registered as config under the plugin's name, verbatim.
    Config(Value),
}

/// The structured view of a [`Response`] that [`Server::call`] and
/// [`Server::route_to`] return to a programmatic caller (no real
/// transport involved).
///
#[derive(Clone, Debug, Default)]
pub struct CallResult {
    pub code: u16,
    pub status: Option<String>,
    pub results: Option<Value>,
    pub error: Option<String>,
    pub errors: Map<String, Value>,
    pub total: Option<u64>,
    pub stack: Vec<StackFrame>,
}

impl From<&Response> for CallResult {
    fn from(res: &Response) -> Self {
        let results = match &res.body {
            crate::request::Body::Structured(v) => Some(v.clone()),
            _ => None,
        };
        Self {
            code: res.code,
            status: res.status.clone(),
            results,
            error: res.error.clone(),
            errors: res.errors.clone(),
            total: res.total,
            stack: res.stack.clone(),
        }
    }
}

/// Extends [`Router`] with configuration, a plugin-config map, and the
/// lifecycle entry points (`bootstrap`, `dispatch`/`handle`, `call`,
/// `route_to`) that an adapter drives.
///
pub struct Server {
    router: Router,
    config: ServerConfig,
    plugin_config: Map<String, Value>,
    pending_plugins: Vec<(String, Plugin)>,
    bootstrapped: bool,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            router: Router::new(),
            config,
            plugin_config: Map::new(),
            pending_plugins: Vec::new(),
            bootstrapped: false,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Declare a plugin to be applied the next time `bootstrap` runs.
    /// Calling this after `bootstrap` has already run has no effect,
    /// mirroring the one-shot, read-only-thereafter plugin map.
    ///
    pub fn plugin(&mut self, name: impl Into<String>, plugin: Plugin) {
        if self.bootstrapped {
            return;
        }
        self.pending_plugins.push((name.into(), plugin));
    }

    /// The config value registered for a bootstrapped plugin, if any.
    ///
    pub fn plugin_config(&self, name: &str) -> Option<&Value> {
        self.plugin_config.get(name)
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    /// Resolve every declared plugin exactly once: first the
    /// programmatically registered ones (configurators run with `&mut
    /// self`, so they may add routes or further plugins of their own),
    /// then the file-discovered ones from `config.plugins`/`config.modules`
    /// via a [`PluginLoader`]. A second call is a no-op -- the tables are
    /// treated as read-only once bootstrapped.
    ///
    pub fn bootstrap(&mut self) -> Result<(), Error> {
        if self.bootstrapped {
            tracing::debug!("bootstrap called again, already bootstrapped");
            return Ok(());
        }
        for (name, plugin) in std::mem::take(&mut self.pending_plugins) {
            self.apply_plugin(name, plugin);
        }
        let mut discovered = Vec::new();
        {
            let mut loader = PluginLoader::new(&self.config);
            loader.bootstrap(&mut |name, value| discovered.push((name, value)))?;
        }
        for (name, value) in discovered {
            self.plugin_config.insert(name, value);
        }
        self.bootstrapped = true;
        tracing::info!(plugins = self.plugin_config.len(), "server bootstrapped");
        Ok(())
    }

    fn apply_plugin(&mut self, name: String, plugin: Plugin) {
        tracing::debug!(plugin = %name, "applying plugin");
        match plugin {
            Plugin::Configurator(configure) => {
                if let Some(value) = configure(self) {
                    self.plugin_config.insert(name, value);
                }
            }
            Plugin::Config(value) => {
                self.plugin_config.insert(name, value);
            }
        }
    }

    /// Drive the full `request -> route -> response` lifecycle for an
    /// already-populated `(Request, Response)` pair, building the PROCESS
    /// queue from the request's own `(method, path)`. Adapters call this
    /// (or install `handler` to replace it) after translating their
    /// transport-native request into `req`.
    ///
    pub async fn dispatch(&self, req: &mut Request, res: &mut Response) {
        if let Some(handler) = self.config.handler.clone() {
            tracing::debug!("dispatch delegated to configured handler override");
            handler(self, req, res).await;
            return;
        }
        let event = Router::trigger_for(&req.method, req.url.path());
        let queue = self.router.tasks_for_trigger(&event);
        let lifecycle = RouteLifecycle::new(self, event, queue);
        lifecycle.run(req, res).await;
    }

    /// Bind a started gateway, if `config.gateway` (here, the `gateway`
    /// field set before construction completed) was configured.
    /// Adapters that do not use a `Gateway` factory never call this.
    ///
    pub async fn serve(self: Arc<Self>) -> std::io::Result<()> {
        match self.config.gateway.clone() {
            Some(gateway) => gateway(self).await,
            None => Ok(()),
        }
    }

    /// A synthetic emission used for programmatic invocation, without a
    /// real transport: wrap `data` in a fresh [`Request`], emit `event`
    /// through the full lifecycle (PREPARE -> `event` -> SHUTDOWN), and
    /// return a structured view of the resulting [`Response`].
    ///
    pub async fn call(
        &self,
        event: &str,
        data: Option<Map<String, Value>>,
    ) -> CallResult {
        let mut req = Request::new();
        req.merge_data(data.unwrap_or_default());
        let mut res = Response::new();
        let queue = self.router.tasks_for_trigger(event);
        let lifecycle = RouteLifecycle::new(self, event.to_string(), queue);
        lifecycle.run(&mut req, &mut res).await;
        CallResult::from(&res)
    }

    /// Sugar for `call(trigger_for(method, path), ...)`.
    ///
    pub async fn route_to(
        &self,
        method: &str,
        path: &str,
        data: Option<Map<String, Value>>,
    ) -> CallResult {
        self.call(&Router::trigger_for(method, path), data).await
    }

    /// The literal-event queue a [`RouteLifecycle`] runs for its PREPARE
    /// and SHUTDOWN phases (`"request"`/`"response"`), and that an
    /// `upgrade_and_emit_error` re-emit uses for `"error"`.
    ///
    pub(crate) fn tasks(&self, event: &str) -> crate::queue::PriorityQueue {
        self.router.tasks_for_trigger(event)
    }
}

impl Deref for Server {
    type Target = Router;
    fn deref(&self) -> &Self::Target {
        &self.router
    }
}

impl DerefMut for Server {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.router
    }
}

/// Convenience so a task can report `false` (the source language's abort
/// sentinel) as `Ok(TaskOutcome::Abort)` without spelling out the enum.
///
pub fn abort() -> Result<TaskOutcome, Error> {
    Ok(TaskOutcome::Abort)
}
