//! Maps literal strings and regular expressions to listener sets.
//!

use crate::queue::PriorityQueue;
use crate::request::RouteMatch;
use crate::task::{task_fn, TaskHandle};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// One side of the `on(event, task, priority)` argument: a literal event
/// string, or a regex plus its flags (`i` case-insensitive, `g` global --
/// see [`PatternEmitter::on`] for how `g` affects matching).
///
#[derive(Clone)]
pub enum EventKey<'a> {
    Literal(&'a str),
    Regex(&'a Regex, &'a str),
}

/// The canonical `/body/flags` stringification of a compiled pattern.
///
/// Implementations must not store raw regex objects as map keys; the
/// canonical string is the key, and the pattern is recompiled on demand
/// from the `(body, flags)` pair kept alongside it.
///
pub fn canonical_regex(body: &str, flags: &str) -> String {
    format!("/{}/{}", body, flags)
}

/// Parse a canonical `/body/flags` string back into its parts, using the
/// first and last `/` as delimiters. Lossy for bodies containing an
/// unescaped `/`.
///
pub fn parse_canonical(key: &str) -> Option<(&str, &str)> {
    let first = key.find('/')?;
    let last = key.rfind('/')?;
    if last <= first {
        return None;
    }
    Some((&key[first + 1..last], &key[last + 1..]))
}

/// What one matched pattern contributes: the trigger it matched and the
/// capture groups extracted from it.
///
#[derive(Clone, Debug, Default)]
pub struct MatchData {
    pub trigger: String,
    pub args: Vec<String>,
}

struct RegexDef {
    body: String,
    flags: String,
}

type ListenerSet = Vec<(TaskHandle, i64)>;

fn listener_set_extend(set: &mut ListenerSet, other: &ListenerSet) {
    for (task, priority) in other {
        if !set.iter().any(|(t, _)| Arc::ptr_eq(t, task)) {
            set.push((task.clone(), *priority));
        }
    }
}

/// A pattern-keyed listener table plus a parallel set of registered
/// regex keys, so emitting need only walk the regexes, not every
/// literal.
///
#[derive(Default)]
pub struct PatternEmitter {
    literal: HashMap<String, ListenerSet>,
    regex_defs: HashMap<String, RegexDef>,
    regex_keys: Vec<String>,
    regex_listeners: HashMap<String, ListenerSet>,
    /// Invoked, if set, before every task copied out by `tasks()`.
    pub before: Option<TaskHandle>,
    /// Invoked, if set, after every task copied out by `tasks()`.
    pub after: Option<TaskHandle>,
}

impl PatternEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` at `priority` against every key in `keys`.
    ///
    pub fn on(&mut self, keys: &[EventKey], task: TaskHandle, priority: i64) {
        for key in keys {
            match key {
                EventKey::Literal(event) => {
                    self.literal
                        .entry(event.to_string())
                        .or_default()
                        .push((task.clone(), priority));
                }
                EventKey::Regex(re, flags) => {
                    let canonical = canonical_regex(re.as_str(), flags);
                    if !self.regex_defs.contains_key(&canonical) {
                        self.regex_defs.insert(
                            canonical.clone(),
                            RegexDef {
                                body: re.as_str().to_string(),
                                flags: flags.to_string(),
                            },
                        );
                        self.regex_keys.push(canonical.clone());
                    }
                    self.regex_listeners
                        .entry(canonical)
                        .or_default()
                        .push((task.clone(), priority));
                }
            }
        }
    }

    /// Remove listeners. `event` matches by key identity; `task` matches
    /// by `Arc` pointer identity. Passing neither removes everything.
    ///
    pub fn unbind(&mut self, event: Option<&str>, task: Option<&TaskHandle>) {
        if event.is_none() && task.is_none() {
            self.literal.clear();
            self.regex_defs.clear();
            self.regex_keys.clear();
            self.regex_listeners.clear();
            return;
        }
        if let Some(event) = event {
            match task {
                Some(task) => {
                    if let Some(set) = self.literal.get_mut(event) {
                        set.retain(|(t, _)| !Arc::ptr_eq(t, task));
                    }
                    if let Some(set) = self.regex_listeners.get_mut(event) {
                        set.retain(|(t, _)| !Arc::ptr_eq(t, task));
                    }
                }
                None => {
                    self.literal.remove(event);
                    self.regex_listeners.remove(event);
                    self.regex_defs.remove(event);
                    self.regex_keys.retain(|k| k != event);
                }
            }
        } else if let Some(task) = task {
            for set in self.literal.values_mut() {
                set.retain(|(t, _)| !Arc::ptr_eq(t, task));
            }
            for set in self.regex_listeners.values_mut() {
                set.retain(|(t, _)| !Arc::ptr_eq(t, task));
            }
        }
    }

    /// Literal hit (if any) followed by every regex that matches
    /// `trigger`, in registration order.
    ///
    pub fn match_trigger(&self, trigger: &str) -> Vec<(String, MatchData)> {
        let mut matches = Vec::new();
        if self.literal.contains_key(trigger) {
            matches.push((
                trigger.to_string(),
                MatchData {
                    trigger: trigger.to_string(),
                    args: Vec::new(),
                },
            ));
        }
        for key in &self.regex_keys {
            let def = &self.regex_defs[key];
            let re = match compile(&def.body, &def.flags) {
                Ok(re) => re,
                Err(_) => continue,
            };
            if let Some(args) = capture_args(&re, trigger) {
                matches.push((
                    key.clone(),
                    MatchData {
                        trigger: trigger.to_string(),
                        args,
                    },
                ));
            }
        }
        matches
    }

    /// Copy every task matching `trigger` into a fresh queue, wrapping
    /// each in a shim that injects `args` into the request's `data`
    /// before running the task, and that runs `before`/`after` around
    /// it.
    ///
    pub fn tasks(&self, trigger: &str) -> PriorityQueue {
        let mut queue = PriorityQueue::new();
        for (key, data) in self.match_trigger(trigger) {
            let set = self
                .literal
                .get(&key)
                .or_else(|| self.regex_listeners.get(&key))
                .cloned()
                .unwrap_or_default();
            for (task, priority) in set {
                queue.add(self.wrap(task, data.clone()), priority);
            }
        }
        queue
    }

    fn wrap(&self, inner: TaskHandle, data: MatchData) -> TaskHandle {
        let before = self.before.clone();
        let after = self.after.clone();
        task_fn(move |req, res, ctx| {
            let inner = inner.clone();
            let before = before.clone();
            let after = after.clone();
            let args = data.args.clone();
            Box::pin(async move {
                if !args.is_empty() {
                    req.merge_route_match(&RouteMatch {
                        args,
                        params: Default::default(),
                    });
                }
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

    /// Import `other`'s regex set and listener table; listener sets are
    /// unioned, deduped by task identity.
    ///
    pub fn use_emitter(&mut self, other: &PatternEmitter) {
        for (event, set) in &other.literal {
            listener_set_extend(self.literal.entry(event.clone()).or_default(), set);
        }
        for key in &other.regex_keys {
            if !self.regex_defs.contains_key(key) {
                let def = &other.regex_defs[key];
                self.regex_defs.insert(
                    key.clone(),
                    RegexDef {
                        body: def.body.clone(),
                        flags: def.flags.clone(),
                    },
                );
                self.regex_keys.push(key.clone());
            }
            if let Some(set) = other.regex_listeners.get(key) {
                listener_set_extend(
                    self.regex_listeners.entry(key.clone()).or_default(),
                    set,
                );
            }
        }
    }

    pub fn listener_set(&self, key: &str) -> Option<&[(TaskHandle, i64)]> {
        self.literal
            .get(key)
            .or_else(|| self.regex_listeners.get(key))
            .map(|v| v.as_slice())
    }
}

fn compile(body: &str, flags: &str) -> Result<Regex, regex::Error> {
    let inline = if flags.contains('i') { "(?i)" } else { "" };
    Regex::new(&format!("{}{}", inline, body))
}

fn capture_args(re: &Regex, trigger: &str) -> Option<Vec<String>> {
    let caps = re.captures(trigger)?;
    let mut args = Vec::new();
    for i in 1..caps.len() {
        if let Some(m) = caps.get(i) {
            args.push(m.as_str().to_string());
        }
    }
    Some(args)
}

/// Extract capture groups from matching `pattern` against `trigger`,
/// used by [`Request::from_pattern`](crate::request::Request::from_pattern).
///
pub fn extract_regex_args(pattern: &Regex, trigger: &str) -> Option<RouteMatch> {
    capture_args(pattern, trigger).map(|args| RouteMatch {
        args,
        params: Default::default(),
    })
}
