//! Translates HTTP `(method, path)` pairs into canonical event names.
//!

use crate::pattern::{canonical_regex, EventKey, PatternEmitter};
use crate::queue::PriorityQueue;
use crate::request::RouteMatch;
use crate::task::TaskHandle;
use regex::Regex;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

/// A registered `(method, path)` pair, as looked up by an adapter that
/// wants to know which route an event name came from.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Route {
    pub method: String,
    pub path: String,
}

#[derive(Clone, Debug)]
enum ParamSlot {
    Named(String),
    Star,
}

/// Compile `path` into a regex body, tracking which capture group (if
/// any) belongs to a named `:token` versus an anonymous `*`/`**`.
///
/// This computes the same net transformation as the three textual
/// passes (`:name` -> `*` -> `([^/]+)`, then `**`'s pair collapsed into
/// `(.*)`) in one left-to-right scan, which avoids the textual version's
/// ambiguity when two tokens are directly adjacent.
///
fn compile_path(path: &str) -> (String, Vec<ParamSlot>) {
    let chars: Vec<char> = path.chars().collect();
    let mut pattern = String::new();
    let mut slots = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == ':' {
            let start = i + 1;
            let mut j = start;
            while j < chars.len()
                && (chars[j].is_ascii_alphanumeric() || chars[j] == '_' || chars[j] == '-')
            {
                j += 1;
            }
            if j > start {
                let name: String = chars[start..j].iter().collect();
                slots.push(ParamSlot::Named(name));
                pattern.push_str("([^/]+)");
                i = j;
                continue;
            }
            pattern.push(c);
            i += 1;
        } else if c == '*' {
            if i + 1 < chars.len() && chars[i + 1] == '*' {
                slots.push(ParamSlot::Star);
                pattern.push_str("(.*)");
                i += 2;
            } else {
                slots.push(ParamSlot::Star);
                pattern.push_str("([^/]+)");
                i += 1;
            }
        } else {
            pattern.push(c);
            i += 1;
        }
    }
    (pattern, slots)
}

/// Trailing slashes on a request path are tolerated; collapse them to a
/// single canonical form (but never strip the root `/`).
///
pub fn normalize_path(path: &str) -> String {
    if path == "/" {
        return "/".to_string();
    }
    path.trim_end_matches('/').to_string()
}

fn method_token(method: &str) -> String {
    if method.eq_ignore_ascii_case("ALL") {
        "[A-Z]+".to_string()
    } else {
        method.to_uppercase()
    }
}

enum EncodedEvent {
    Literal(String),
    Regex(String, String),
}

/// Encode a `(method, path)` registration into its canonical event name,
/// returning the event key together with the `Route` to store for it.
///
fn encode_event(method: &str, path: &str) -> (EncodedEvent, Vec<ParamSlot>) {
    let (pattern, slots) = compile_path(path);
    let is_all = method.eq_ignore_ascii_case("ALL");
    if slots.is_empty() && !is_all {
        (
            EncodedEvent::Literal(format!("{} {}", method.to_uppercase(), path)),
            slots,
        )
    } else {
        let body = format!("^{} {}/*$", method_token(method), pattern);
        (EncodedEvent::Regex(body, "ig".to_string()), slots)
    }
}

/// Extract `args`/`params` for route-path `path` against `pathname`,
/// without involving the registered route table. Used by
/// [`Request::from_route`](crate::request::Request::from_route).
///
pub fn extract_path_params(path: &str, pathname: &str) -> Option<RouteMatch> {
    let (pattern, slots) = compile_path(path);
    let re = Regex::new(&format!("^{}/*$", pattern)).ok()?;
    let caps = re.captures(pathname)?;
    let mut params = HashMap::new();
    let mut args = Vec::new();
    for (idx, slot) in slots.iter().enumerate() {
        let value = caps.get(idx + 1).map(|m| m.as_str()).unwrap_or("");
        match slot {
            ParamSlot::Named(name) => {
                params.insert(name.clone(), value.to_string());
            }
            ParamSlot::Star => {
                if value.contains('/') {
                    args.extend(value.split('/').map(|s| s.to_string()));
                } else {
                    args.push(value.to_string());
                }
            }
        }
    }
    Some(RouteMatch { args, params })
}

/// A [`PatternEmitter`] extended with `(method, path)` route translation.
///
/// Method-specific registrars (`get`, `post`, ...) and `all` lower a
/// route to an event name and register it with the underlying emitter;
/// `on` is still available for event names or regexes that bypass route
/// translation entirely.
///
#[derive(Default)]
pub struct Router {
    emitter: PatternEmitter,
    routes: HashMap<String, Route>,
    slots: HashMap<String, Vec<ParamSlot>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` at `priority` for `method path`, returning the
    /// event name it was lowered to.
    ///
    pub fn route(
        &mut self,
        method: &str,
        path: &str,
        task: TaskHandle,
        priority: i64,
    ) -> String {
        let (encoded, slots) = encode_event(method, path);
        let event = match &encoded {
            EncodedEvent::Literal(event) => event.clone(),
            EncodedEvent::Regex(body, flags) => canonical_regex(body, flags),
        };
        if !self.routes.contains_key(&event) {
            self.routes.insert(
                event.clone(),
                Route {
                    method: method.to_uppercase(),
                    path: path.to_string(),
                },
            );
            self.slots.insert(event.clone(), slots);
        }
        match encoded {
            EncodedEvent::Literal(event) => {
                self.emitter
                    .on(&[EventKey::Literal(&event)], task, priority);
            }
            EncodedEvent::Regex(body, flags) => {
                if let Ok(compiled) = Regex::new(&body) {
                    self.emitter.on(
                        &[EventKey::Regex(&compiled, &flags)],
                        task,
                        priority,
                    );
                }
            }
        }
        event
    }

    pub fn get(&mut self, path: &str, task: TaskHandle, priority: i64) -> String {
        self.route("GET", path, task, priority)
    }
    pub fn post(&mut self, path: &str, task: TaskHandle, priority: i64) -> String {
        self.route("POST", path, task, priority)
    }
    pub fn put(&mut self, path: &str, task: TaskHandle, priority: i64) -> String {
        self.route("PUT", path, task, priority)
    }
    pub fn patch(&mut self, path: &str, task: TaskHandle, priority: i64) -> String {
        self.route("PATCH", path, task, priority)
    }
    pub fn delete(&mut self, path: &str, task: TaskHandle, priority: i64) -> String {
        self.route("DELETE", path, task, priority)
    }
    pub fn head(&mut self, path: &str, task: TaskHandle, priority: i64) -> String {
        self.route("HEAD", path, task, priority)
    }
    pub fn options(&mut self, path: &str, task: TaskHandle, priority: i64) -> String {
        self.route("OPTIONS", path, task, priority)
    }
    pub fn connect(&mut self, path: &str, task: TaskHandle, priority: i64) -> String {
        self.route("CONNECT", path, task, priority)
    }
    pub fn trace(&mut self, path: &str, task: TaskHandle, priority: i64) -> String {
        self.route("TRACE", path, task, priority)
    }
    pub fn all(&mut self, path: &str, task: TaskHandle, priority: i64) -> String {
        self.route("ALL", path, task, priority)
    }

    /// The trigger string for an incoming `(method, path)` request,
    /// tolerating a trailing slash on `path`.
    ///
    pub fn trigger_for(method: &str, path: &str) -> String {
        format!("{} {}", method.to_uppercase(), normalize_path(path))
    }

    /// Look up which route produced `event`, if any.
    ///
    pub fn route_for_event(&self, event: &str) -> Option<&Route> {
        self.routes.get(event)
    }

    /// Build the queue to run for an incoming `(method, path)` request:
    /// every matching pattern's tasks, each wrapped to merge `params`
    /// (first-write-wins) and `args` (last-match-wins) into the
    /// request's `data` before running.
    ///
    pub fn tasks_for_request(&self, method: &str, path: &str) -> PriorityQueue {
        self.tasks_for_trigger(&Self::trigger_for(method, path))
    }

    /// Same as [`Router::tasks_for_request`], but starting from an
    /// already-built trigger string (e.g. one passed directly to
    /// [`Server::call`](crate::server::Server::call)) rather than a
    /// `(method, path)` pair.
    ///
    pub fn tasks_for_trigger(&self, trigger: &str) -> PriorityQueue {
        let mut queue = PriorityQueue::new();
        let before = self.emitter.before.clone();
        let after = self.emitter.after.clone();
        for (key, data) in self.emitter.match_trigger(trigger) {
            let matched = self.route_for_event(&key).map(|route| {
                map_slots(self.slots.get(&key), &data.args, &route.path)
            });
            let set = self.emitter.listener_set(&key).unwrap_or_default();
            for (task, priority) in set {
                let wrapped = wrap_with_match(
                    task.clone(),
                    matched.clone().unwrap_or_else(|| RouteMatch {
                        args: data.args.clone(),
                        params: Default::default(),
                    }),
                    before.clone(),
                    after.clone(),
                );
                queue.add(wrapped, *priority);
            }
        }
        queue
    }
}

fn map_slots(
    slots: Option<&Vec<ParamSlot>>,
    args: &[String],
    _original_path: &str,
) -> RouteMatch {
    let mut params = HashMap::new();
    let mut extra = Vec::new();
    match slots {
        Some(slots) => {
            for (idx, slot) in slots.iter().enumerate() {
                let value = args.get(idx).cloned().unwrap_or_default();
                match slot {
                    ParamSlot::Named(name) => {
                        params.insert(name.clone(), value);
                    }
                    ParamSlot::Star => {
                        if value.contains('/') {
                            extra.extend(value.split('/').map(|s| s.to_string()));
                        } else {
                            extra.push(value);
                        }
                    }
                }
            }
        }
        None => extra.extend(args.iter().cloned()),
    }
    RouteMatch { args: extra, params }
}

fn wrap_with_match(
    inner: TaskHandle,
    matched: RouteMatch,
    before: Option<TaskHandle>,
    after: Option<TaskHandle>,
) -> TaskHandle {
    crate::task::task_fn(move |req, res, ctx| {
        let inner = inner.clone();
        let matched = matched.clone();
        let before = before.clone();
        let after = after.clone();
        Box::pin(async move {
            req.merge_route_match(&matched);
            if let Some(before) = &before {
                let outcome = before.call(req, res, ctx).await?;
                if outcome == crate::task::TaskOutcome::Abort {
                    return Ok(outcome);
                }
            }
            let outcome = inner.call(req, res, ctx).await?;
            if outcome == crate::task::TaskOutcome::Abort {
                return Ok(outcome);
            }
            if let Some(after) = &after {
                return after.call(req, res, ctx).await;
            }
            Ok(outcome)
        })
    })
}

impl Deref for Router {
    type Target = PatternEmitter;
    fn deref(&self) -> &Self::Target {
        &self.emitter
    }
}

impl DerefMut for Router {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.emitter
    }
}
