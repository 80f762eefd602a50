//! The mutable payload object the router dispatches against.
//!

use crate::error::Error;
use crate::server::Server;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// The body loader an adapter installs on a [`Request`]; invoked lazily,
/// at most once, by [`Request::load`].
///
pub type BodyLoader = Arc<
    dyn Fn() -> futures::future::BoxFuture<'static, Result<LoadedBody, Error>>
        + Send
        + Sync,
>;

/// What a [`BodyLoader`] hands back: the decoded body plus any post
/// fields it parsed out of it (form or multipart bodies carry both).
///
pub struct LoadedBody {
    pub body: Body,
    pub post: Map<String, Value>,
}

/// The typed discriminated body a Request or Response carries.
///
#[derive(Clone, Debug)]
pub enum Body {
    Text(String),
    Binary(Vec<u8>),
    Stream,
    Structured(Value),
    Null,
}

impl Body {
    /// The discriminator spec'd for serialisers in the adapter layer.
    ///
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Binary(_) => "buffer",
            Self::Stream => "stream",
            Self::Structured(Value::Array(_)) => "array",
            Self::Structured(_) => "object",
            Self::Text(_) => "string",
            Self::Null => "null",
        }
    }
}

/// The result of matching a path pattern or regex against a pathname,
/// as returned by [`Request::from_route`] and [`Request::from_pattern`].
///
#[derive(Clone, Debug, Default)]
pub struct RouteMatch {
    pub args: Vec<String>,
    pub params: HashMap<String, String>,
}

/// A multi-valued, case-preserved header table.
///
#[derive(Clone, Debug, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.entries.iter()
    }
}

/// A per-invocation HTTP request.
///
/// Owned by the lifecycle that created it; listeners may mutate it
/// freely without locking, but it must not escape that lifecycle (see
/// the concurrency model).
///
pub struct Request {
    pub method: String,
    pub url: Url,
    pub headers: Headers,
    pub query: Map<String, Value>,
    pub post: Map<String, Value>,
    pub data: Map<String, Value>,
    pub session: HashMap<String, String>,
    pub body: Body,
    pub mimetype: Option<String>,
    pub loaded: bool,
    pub loader: Option<BodyLoader>,
    pub resource: Option<Arc<dyn Any + Send + Sync>>,
    pub context: Option<Arc<Server>>,
}

impl Request {
    /// A bare request: `GET http://unknownhost/`, no headers, no body.
    ///
    pub fn new() -> Self {
        Self {
            method: "GET".to_string(),
            url: Url::parse("http://unknownhost/").expect("static URL"),
            headers: Headers::new(),
            query: Map::new(),
            post: Map::new(),
            data: Map::new(),
            session: HashMap::new(),
            body: Body::Null,
            mimetype: None,
            loaded: false,
            loader: None,
            resource: None,
            context: None,
        }
    }

    /// Recompute `data` as `query ∪ post ∪ explicit`, later sources
    /// overwriting earlier ones. Adapters call this once they have
    /// populated `query`/`post`/any explicit seed data.
    ///
    pub fn merge_data(&mut self, explicit: Map<String, Value>) {
        let mut merged = self.query.clone();
        for (k, v) in self.post.clone() {
            merged.insert(k, v);
        }
        for (k, v) in explicit {
            merged.insert(k, v);
        }
        self.data = merged;
    }

    /// Merge route parameters into `data`: named `params` never overwrite
    /// a key that is already present (first-write-wins), while `args`
    /// overwrites on every call (last-write-wins), so that when more than
    /// one pattern matches a trigger, the latest match's `args` is what
    /// the handler sees.
    ///
    pub fn merge_route_match(&mut self, matched: &RouteMatch) {
        for (k, v) in &matched.params {
            self.data
                .entry(k.clone())
                .or_insert_with(|| Value::String(v.clone()));
        }
        if !matched.args.is_empty() {
            self.data.insert(
                "args".to_string(),
                Value::Array(matched.args.iter().cloned().map(Value::String).collect()),
            );
        }
    }

    /// A one-shot body read. Idempotent: once `loaded`, calling this
    /// again is a no-op and returns immediately, regardless of whether a
    /// loader was installed or what it returned the first time.
    ///
    pub async fn load(&mut self) -> Result<(), Error> {
        if self.loaded {
            return Ok(());
        }
        if let Some(loader) = self.loader.clone() {
            let loaded = loader().await?;
            self.body = loaded.body;
            for (k, v) in loaded.post.clone() {
                self.post.insert(k, v);
                self.data.insert(k, v);
            }
        }
        self.loaded = true;
        Ok(())
    }

    /// The discriminator spec'd for body-aware serialisers.
    ///
    pub fn body_type(&self) -> &'static str {
        self.body.type_name()
    }

    /// Extract `args`/`params` for `path` (a route-path pattern) against
    /// this request's current `url.pathname`, without dispatching.
    ///
    pub fn from_route(&self, path: &str) -> Option<RouteMatch> {
        crate::router::extract_path_params(path, self.url.path())
    }

    /// Extract `args` for a regular expression against this request's
    /// current `url.pathname`, without dispatching.
    ///
    pub fn from_pattern(&self, pattern: &regex::Regex) -> Option<RouteMatch> {
        crate::pattern::extract_regex_args(pattern, self.url.path())
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_merges_query_then_post_then_explicit() {
        let mut req = Request::new();
        req.query.insert("a".to_string(), Value::String("query".to_string()));
        req.post.insert("a".to_string(), Value::String("post".to_string()));
        req.post.insert("b".to_string(), Value::String("post-b".to_string()));
        let mut explicit = Map::new();
        explicit.insert("a".to_string(), Value::String("explicit".to_string()));
        req.merge_data(explicit);
        assert_eq!(req.data.get("a").unwrap(), "explicit");
        assert_eq!(req.data.get("b").unwrap(), "post-b");
    }

    #[test]
    fn route_match_never_overwrites_an_existing_key() {
        let mut req = Request::new();
        req.data.insert("id".to_string(), Value::String("already-set".to_string()));
        let mut params = HashMap::new();
        params.insert("id".to_string(), "42".to_string());
        req.merge_route_match(&RouteMatch { args: Vec::new(), params });
        assert_eq!(req.data.get("id").unwrap(), "already-set");
    }

    #[test]
    fn later_route_match_overwrites_an_earlier_args_value() {
        let mut req = Request::new();
        req.merge_route_match(&RouteMatch {
            args: vec!["first".to_string()],
            params: HashMap::new(),
        });
        req.merge_route_match(&RouteMatch {
            args: vec!["second".to_string()],
            params: HashMap::new(),
        });
        assert_eq!(
            req.data.get("args").unwrap(),
            &Value::Array(vec![Value::String("second".to_string())])
        );
    }

    #[actix_rt::test]
    async fn load_is_idempotent_and_invokes_the_loader_once() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let mut req = Request::new();
        req.loader = Some(Arc::new(move || {
            let calls = calls2.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(LoadedBody {
                    body: Body::Text("hi".to_string()),
                    post: Map::new(),
                })
            })
        }));
        req.load().await.unwrap();
        req.load().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
