//! The mutable payload object listeners write to and which the adapter
//! eventually serialises.
//!

use crate::request::{Body, Request};
use crate::status::status_reason_phrase;
use serde_json::{Map, Value};
use std::any::Any;
use std::sync::Arc;

/// A single mutation recorded against [`Response::session`].
///
/// The adapter replays this log into `Set-Cookie` headers; `Remove`
/// becomes a cookie with `expires` set to the epoch.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionRevision {
    Set(String, String),
    Remove(String),
}

/// A `{file, line, char, method}` stack frame, as attached by the
/// lifecycle's error-interception wrapper.
///
pub use crate::error::StackFrame;

/// Serialises a [`Response`] onto its native transport; installed by the
/// adapter before the lifecycle runs.
///
pub type Dispatcher =
    Arc<dyn Fn(&Response) -> futures::future::BoxFuture<'static, ()> + Send + Sync>;

/// The per-invocation response a lifecycle mutates and eventually
/// dispatches.
///
pub struct Response {
    pub body: Body,
    pub mimetype: Option<String>,
    pub code: u16,
    pub status: Option<String>,
    pub headers: Vec<(String, String)>,
    pub session: Vec<SessionRevision>,
    pub error: Option<String>,
    pub errors: Map<String, Value>,
    pub stack: Vec<StackFrame>,
    pub total: Option<u64>,
    pub sent: bool,
    pub resource: Option<Arc<dyn Any + Send + Sync>>,
    pub dispatcher: Option<Dispatcher>,
}

impl Response {
    pub fn new() -> Self {
        Self {
            body: Body::Null,
            mimetype: None,
            code: 0,
            status: None,
            headers: Vec::new(),
            session: Vec::new(),
            error: None,
            errors: Map::new(),
            stack: Vec::new(),
            total: None,
            sent: false,
            resource: None,
            dispatcher: None,
        }
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Sets `code` and, unless `status` is given, also sets `status`
    /// from the built-in reason-phrase table.
    ///
    pub fn set_status(&mut self, code: u16, status: Option<String>) {
        self.code = code;
        self.status =
            Some(status.unwrap_or_else(|| status_reason_phrase(code).to_string()));
    }

    pub fn set_body(&mut self, body: Body, code: u16, status: Option<String>) {
        self.body = body;
        self.set_status(code, status);
    }

    pub fn set_html(&mut self, html: impl Into<String>, code: u16, status: Option<String>) {
        self.mimetype = Some("text/html".to_string());
        self.set_body(Body::Text(html.into()), code, status);
    }

    pub fn set_json(&mut self, value: Value, code: u16, status: Option<String>) {
        self.mimetype = Some("application/json".to_string());
        self.set_body(Body::Structured(value), code, status);
    }

    pub fn set_xml(&mut self, xml: impl Into<String>, code: u16, status: Option<String>) {
        self.mimetype = Some("application/xml".to_string());
        self.set_body(Body::Text(xml.into()), code, status);
    }

    pub fn set_results(&mut self, value: Value, code: u16, status: Option<String>) {
        self.set_json(value, code, status);
    }

    pub fn set_rows(
        &mut self,
        body: Value,
        total: u64,
        code: u16,
        status: Option<String>,
    ) {
        self.total = Some(total);
        self.set_json(body, code, status);
    }

    /// Sets `error` (and, if not already set, `code=400`).
    ///
    pub fn set_error(&mut self, message: impl Into<String>, code: Option<u16>) {
        self.error = Some(message.into());
        self.set_status(code.unwrap_or(400), None);
    }

    pub fn redirect(&mut self, url: impl Into<String>, code: u16, status: Option<String>) {
        self.add_header("Location", url.into());
        self.set_status(code, status);
    }

    pub fn session_set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.session.push(SessionRevision::Set(name.into(), value.into()));
    }

    pub fn session_remove(&mut self, name: impl Into<String>) {
        self.session.push(SessionRevision::Remove(name.into()));
    }

    /// Enqueue a `remove` revision for every key known to `request`'s
    /// session.
    ///
    pub fn session_clear(&mut self, request: &Request) {
        for key in request.session.keys() {
            self.session_remove(key.clone());
        }
    }

    /// Calls the configured dispatcher exactly once; a second call is a
    /// no-op.
    ///
    pub async fn dispatch(&mut self) {
        if self.sent {
            return;
        }
        if let Some(dispatcher) = self.dispatcher.clone() {
            dispatcher(self).await;
        }
        self.sent = true;
    }

    /// The JSON envelope adapters fall back to when the body is
    /// structured, or null with a code/status already set.
    ///
    pub fn envelope(&self) -> Value {
        let mut map = Map::new();
        map.insert("code".to_string(), Value::from(self.code));
        if let Some(status) = &self.status {
            map.insert("status".to_string(), Value::String(status.clone()));
        }
        if let Body::Structured(value) = &self.body {
            map.insert("results".to_string(), value.clone());
        }
        if let Some(error) = &self.error {
            map.insert("error".to_string(), Value::String(error.clone()));
        }
        if !self.errors.is_empty() {
            map.insert("errors".to_string(), Value::Object(self.errors.clone()));
        }
        if let Some(total) = self.total {
            map.insert("total".to_string(), Value::from(total));
        }
        if !self.stack.is_empty() {
            let frames: Vec<Value> = self
                .stack
                .iter()
                .map(|f| {
                    let mut m = Map::new();
                    m.insert("file".to_string(), Value::String(f.file.clone()));
                    m.insert("line".to_string(), Value::from(f.line));
                    m.insert("char".to_string(), Value::from(f.char));
                    m.insert("method".to_string(), Value::String(f.method.clone()));
                    Value::Object(m)
                })
                .collect();
            map.insert("stack".to_string(), Value::Array(frames));
        }
        Value::Object(map)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_status_fills_in_the_reason_phrase() {
        let mut res = Response::new();
        res.set_status(404, None);
        assert_eq!(res.status.as_deref(), Some("Not Found"));
    }

    #[test]
    fn set_error_without_code_defaults_to_400() {
        let mut res = Response::new();
        res.set_error("bad input", None);
        assert_eq!(res.code, 400);
    }

    #[actix_rt::test]
    async fn dispatch_invokes_the_dispatcher_at_most_once() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let mut res = Response::new();
        res.dispatcher = Some(Arc::new(move |_res| {
            let calls = calls2.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        }));
        res.dispatch().await;
        res.dispatch().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(res.sent);
    }
}
