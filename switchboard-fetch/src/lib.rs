//! A second, minimal transport adapter built on the `http` crate's
//! framework-agnostic `Request`/`Response` types instead of `actix-web`,
//! demonstrating that `switchboard::Server` is transport-agnostic.
//!
//! There is no listening socket here -- a "fetch" style runtime (an edge
//! worker, a WASM host, a test harness) calls [`handle`] once per
//! incoming request and is handed back a `http::Response<Vec<u8>>`; the
//! adapter only translates, the way `switchboard-actix` does against
//! `actix-web` but without anything resembling a `Gateway`/bound socket.

use cookie::time::{Duration, OffsetDateTime};
use cookie::{Cookie, CookieBuilder, SameSite as CkSameSite};
use http::{HeaderMap, Request as HttpRequest, Response as HttpResponse, StatusCode};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use switchboard::{Body, CookieOptions, CookiePriority, LoadedBody, Request, Response, SameSite, Server, SessionRevision};
use url::Url;

fn first_forwarded(value: &str) -> String {
    value.split(',').next().unwrap_or(value).trim().to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_query(query: &str) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
        map.insert(k.into_owned(), Value::String(v.into_owned()));
    }
    map
}

/// Parse a `Cookie` header into a flat name->value map.
///
pub fn parse_cookie_header(header: &str) -> std::collections::HashMap<String, String> {
    let mut map = std::collections::HashMap::new();
    for part in header.split(';') {
        let part = part.trim();
        if let Some((name, value)) = part.split_once('=') {
            map.insert(name.trim().to_string(), value.trim().to_string());
        }
    }
    map
}

fn apply_common<'c>(mut builder: CookieBuilder<'c>, opts: &CookieOptions) -> CookieBuilder<'c> {
    if let Some(domain) = &opts.domain {
        builder = builder.domain(domain.clone());
    }
    if let Some(path) = &opts.path {
        builder = builder.path(path.clone());
    }
    builder = builder.http_only(opts.http_only).secure(opts.secure);
    if let Some(same_site) = opts.same_site {
        let mapped = match same_site {
            SameSite::True | SameSite::Strict => CkSameSite::Strict,
            SameSite::Lax => CkSameSite::Lax,
            SameSite::None => CkSameSite::None,
            SameSite::False => return builder,
        };
        builder = builder.same_site(mapped);
    }
    builder
}

/// `priority` has no first-class representation in the `cookie` crate;
/// it is threaded through as a `Priority=...` attribute appended to the
/// serialised header, the way browsers that understand the (still
/// draft) attribute expect it.
///
fn priority_suffix(priority: Option<CookiePriority>) -> &'static str {
    match priority {
        Some(CookiePriority::Low) => "; Priority=Low",
        Some(CookiePriority::Medium) => "; Priority=Medium",
        Some(CookiePriority::High) => "; Priority=High",
        None => "",
    }
}

/// Build the `Set-Cookie` header value for `set(name, value)`.
///
pub fn set_cookie_header(name: &str, value: &str, opts: &CookieOptions) -> String {
    let mut builder = apply_common(Cookie::build(name.to_string(), value.to_string()), opts);
    if let Some(max_age) = opts.max_age {
        builder = builder.max_age(Duration::seconds(max_age));
    }
    if let Some(expires) = opts.expires {
        if let Ok(at) = OffsetDateTime::from_unix_timestamp(expires) {
            builder = builder.expires(at);
        }
    }
    format!("{}{}", builder.finish(), priority_suffix(opts.priority))
}

/// Build the `Set-Cookie` header value for `remove(name)`: an
/// immediately-expiring cookie with `expires` set to the epoch.
///
pub fn remove_cookie_header(name: &str, opts: &CookieOptions) -> String {
    let builder = apply_common(Cookie::build(name.to_string(), ""), opts)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .max_age(Duration::ZERO);
    format!("{}{}", builder.finish(), priority_suffix(opts.priority))
}

fn session_headers(res: &Response, opts: &CookieOptions) -> Vec<String> {
    res.session
        .iter()
        .map(|revision| match revision {
            SessionRevision::Set(name, value) => set_cookie_header(name, value, opts),
            SessionRevision::Remove(name) => remove_cookie_header(name, opts),
        })
        .collect()
}

fn build_request(req: &HttpRequest<Vec<u8>>) -> Request {
    let mut request = Request::new();
    request.method = req.method().as_str().to_string();

    let scheme = header_str(req.headers(), "x-forwarded-proto")
        .map(first_forwarded)
        .unwrap_or_else(|| "http".to_string());
    let host = header_str(req.headers(), "x-forwarded-host")
        .map(first_forwarded)
        .or_else(|| header_str(req.headers(), "host").map(str::to_string))
        .unwrap_or_else(|| "unknownhost".to_string());
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    if let Ok(url) = Url::parse(&format!("{}://{}{}", scheme, host, path_and_query)) {
        request.url = url;
    }

    for (name, value) in req.headers().iter() {
        if let Ok(value) = value.to_str() {
            request.headers.insert(name.as_str(), value);
        }
    }

    request.query = parse_query(req.uri().query().unwrap_or(""));

    if let Some(cookie_header) = header_str(req.headers(), "cookie") {
        request.session = parse_cookie_header(cookie_header);
    }

    let mimetype = header_str(req.headers(), "content-type").map(str::to_string);
    request.mimetype = mimetype.clone();
    let body = req.body().clone();
    request.loader = Some(Arc::new(move || {
        let body = body.clone();
        let mimetype = mimetype.clone();
        Box::pin(async move {
            let post = match mimetype.as_deref() {
                Some(ct) if ct.starts_with("application/x-www-form-urlencoded") => {
                    parse_query(&String::from_utf8_lossy(&body))
                }
                _ => Map::new(),
            };
            let parsed_body = match std::str::from_utf8(&body) {
                Ok(text) => Body::Text(text.to_string()),
                Err(_) => Body::Binary(body.clone()),
            };
            Ok(LoadedBody {
                body: parsed_body,
                post,
            })
        })
    }));

    request
}

/// Serialise `res`: verbatim text/binary, or the
/// `{code,status,results,error,errors,total,stack}` JSON envelope.
/// Stream bodies are not representable over `http::Response<Vec<u8>>`
/// without a framework-specific streaming body type, so a stream-typed
/// response here degrades to an empty body with its configured status.
///
fn build_response(res: &Response, cookie: &CookieOptions) -> HttpResponse<Vec<u8>> {
    let mut builder =
        HttpResponse::builder().status(StatusCode::from_u16(res.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));

    for (name, value) in &res.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    for cookie_header in session_headers(res, cookie) {
        builder = builder.header("Set-Cookie", cookie_header);
    }

    let (mimetype, bytes) = match &res.body {
        Body::Text(text) => (
            res.mimetype.clone().unwrap_or_else(|| "text/plain".to_string()),
            text.clone().into_bytes(),
        ),
        Body::Binary(bytes) => (
            res.mimetype.clone().unwrap_or_else(|| "text/plain".to_string()),
            bytes.clone(),
        ),
        Body::Stream => (
            res.mimetype.clone().unwrap_or_else(|| "text/plain".to_string()),
            Vec::new(),
        ),
        Body::Structured(_) | Body::Null => (
            "application/json".to_string(),
            res.envelope().to_string().into_bytes(),
        ),
    };
    builder = builder.header("Content-Type", mimetype);
    builder.body(bytes).unwrap_or_else(|_| {
        HttpResponse::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Vec::new())
            .expect("a fixed empty-body response always builds")
    })
}

/// Build a request, run `server.dispatch`, and serialise the result.
///
pub async fn handle(server: Arc<Server>, req: HttpRequest<Vec<u8>>) -> HttpResponse<Vec<u8>> {
    tracing::debug!(method = %req.method(), path = %req.uri().path(), "received request");
    let mut request = build_request(&req);
    let built: Arc<Mutex<Option<HttpResponse<Vec<u8>>>>> = Arc::new(Mutex::new(None));
    let mut response = Response::new();

    let cookie = server.config().cookie.clone();
    let slot = built.clone();
    response.dispatcher = Some(Arc::new(move |res: &Response| {
        *slot.lock().unwrap() = Some(build_response(res, &cookie));
        Box::pin(async {})
    }));

    server.dispatch(&mut request, &mut response).await;
    response.dispatch().await;

    built.lock().unwrap().take().unwrap_or_else(|| {
        HttpResponse::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Vec::new())
            .expect("a fixed empty-body response always builds")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard::{task_fn, ServerConfig, TaskOutcome};

    #[actix_rt::test]
    async fn translates_a_literal_route_round_trip() {
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

        let req = HttpRequest::builder()
            .method("GET")
            .uri("/ping")
            .body(Vec::new())
            .unwrap();
        let res = handle(server, req).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), b"pong");
    }

    #[test]
    fn remove_cookie_sets_epoch_expiry() {
        let header = remove_cookie_header("sid", &CookieOptions::default());
        assert!(header.contains("sid="));
        assert!(header.contains("1970"));
    }
}
