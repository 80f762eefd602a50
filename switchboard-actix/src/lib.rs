//! Translates `actix-web` request/response pairs into `switchboard`'s
//! `Request`/`Response`, drives `Server::dispatch`, and serialises the
//! result back onto the wire.
//!
//! Builder-style status/header/body translation, with `actix_files` for
//! file-backed bodies, reworked against `switchboard::{Request, Response}`
//! and `Server::dispatch` instead of a compile-time route table.

mod session;

pub use session::{parse_cookie_header, remove_cookie_header, session_headers, set_cookie_header};

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer as ActixHttpServer, Responder};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use switchboard::{Body, CookieOptions, LoadedBody, Request, Response, Server};
use url::Url;

/// Placed in `Response::resource` to mark a stream-typed body that
/// should be served from disk, since `switchboard::Body::Stream` itself
/// carries no payload -- the core leaves the actual stream object
/// transport-specific.
///
pub struct FileStream(pub PathBuf);

/// The first value of a comma-separated forwarded-header list, trimmed.
///
fn first_forwarded(value: &str) -> String {
    value.split(',').next().unwrap_or(value).trim().to_string()
}

fn request_scheme(req: &HttpRequest) -> String {
    req.headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(first_forwarded)
        .unwrap_or_else(|| req.connection_info().scheme().to_string())
}

fn request_host(req: &HttpRequest) -> String {
    req.headers()
        .get("x-forwarded-host")
        .and_then(|v| v.to_str().ok())
        .map(first_forwarded)
        .unwrap_or_else(|| req.connection_info().host().to_string())
}

fn parse_query(query: &str) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
        map.insert(k.into_owned(), Value::String(v.into_owned()));
    }
    map
}

fn content_type(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(actix_web::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn multipart_boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_string())
}

/// A minimal hand-rolled multipart parser pulling text-field name/value
/// pairs out of `body`. File parts (entries carrying a `filename`) are
/// skipped: file upload storage is left to the application's own loader.
///
fn parse_multipart(body: &[u8], boundary: &str) -> Map<String, Value> {
    let mut map = Map::new();
    let marker = format!("--{}", boundary).into_bytes();
    let text = String::from_utf8_lossy(body);
    for raw_part in text.split(&String::from_utf8_lossy(&marker).into_owned()) {
        let part = raw_part.trim_start_matches("\r\n").trim_end_matches("--\r\n");
        let Some((headers, contents)) = part.split_once("\r\n\r\n") else {
            continue;
        };
        if headers.contains("filename=") {
            continue;
        }
        let Some(name_field) = headers
            .split(';')
            .map(str::trim)
            .find_map(|seg| seg.strip_prefix("name="))
        else {
            continue;
        };
        let name = name_field.trim_matches('"').to_string();
        let value = contents.trim_end_matches("\r\n").to_string();
        map.insert(name, Value::String(value));
    }
    map
}

fn build_request(req: &HttpRequest, body: web::Bytes) -> Request {
    let mut request = Request::new();
    request.method = req.method().as_str().to_string();

    let scheme = request_scheme(req);
    let host = request_host(req);
    if let Ok(url) = Url::parse(&format!("{}://{}{}", scheme, host, req.uri())) {
        request.url = url;
    }

    for (name, value) in req.headers().iter() {
        if let Ok(value) = value.to_str() {
            request.headers.insert(name.as_str(), value);
        }
    }

    request.query = parse_query(req.uri().query().unwrap_or(""));

    if let Some(cookie_header) = req
        .headers()
        .get(actix_web::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
    {
        request.session = parse_cookie_header(cookie_header);
    }

    let mimetype = content_type(req);
    request.mimetype = mimetype.clone();
    request.loader = Some(Arc::new(move || {
        let body = body.clone();
        let mimetype = mimetype.clone();
        Box::pin(async move {
            let post = match mimetype.as_deref() {
                Some(ct) if ct.starts_with("application/x-www-form-urlencoded") => {
                    parse_query(&String::from_utf8_lossy(&body))
                }
                Some(ct) if ct.starts_with("multipart/form-data") => {
                    match multipart_boundary(ct) {
                        Some(boundary) => parse_multipart(&body, &boundary),
                        None => Map::new(),
                    }
                }
                _ => Map::new(),
            };
            let parsed_body = match std::str::from_utf8(&body) {
                Ok(text) => Body::Text(text.to_string()),
                Err(_) => Body::Binary(body.to_vec()),
            };
            Ok(LoadedBody {
                body: parsed_body,
                post,
            })
        })
    }));

    request.merge_data(Map::new());
    request
}

/// Serialise `res`: verbatim text/binary, a file-backed stream via
/// `actix_files`, or the `{code,status,results,error,errors,total,stack}`
/// JSON envelope.
///
fn build_response(res: &Response, cookie: &CookieOptions, actix_req: &HttpRequest) -> HttpResponse {
    let status = actix_web::http::StatusCode::from_u16(res.code)
        .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = HttpResponse::build(status);
    for (name, value) in &res.headers {
        builder.append_header((name.as_str(), value.as_str()));
    }
    for cookie_header in session_headers(res, cookie) {
        builder.append_header(("Set-Cookie", cookie_header));
    }

    match &res.body {
        Body::Text(text) => {
            let mimetype = res.mimetype.as_deref().unwrap_or("text/plain");
            builder.content_type(mimetype).body(text.clone())
        }
        Body::Binary(bytes) => {
            let mimetype = res.mimetype.as_deref().unwrap_or("text/plain");
            builder.content_type(mimetype).body(bytes.clone())
        }
        Body::Stream => {
            let file = res
                .resource
                .as_ref()
                .and_then(|r| r.clone().downcast::<FileStream>().ok());
            match file {
                Some(file) => match actix_files::NamedFile::open(&file.0) {
                    Ok(named) => return named.respond_to(actix_req),
                    Err(e) => HttpResponse::NotFound().body(e.to_string()),
                },
                None => builder.finish(),
            }
        }
        Body::Structured(_) | Body::Null => builder
            .content_type("application/json")
            .body(res.envelope().to_string()),
    }
}

/// Build a request, run `server.dispatch`, and serialise the result.
/// This is the actix-specific body of the user-replaceable handler a
/// `Server` can install, with this as the default an application never
/// has to write itself.
///
pub async fn handle(
    server: Arc<Server>,
    actix_req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    tracing::debug!(
        method = %actix_req.method(),
        path = %actix_req.path(),
        "received request"
    );
    let mut request = build_request(&actix_req, body);
    let dispatched: Arc<Mutex<Option<HttpResponse>>> = Arc::new(Mutex::new(None));
    let mut response = Response::new();

    let cookie = server.config().cookie.clone();
    let slot = dispatched.clone();
    let req_for_dispatcher = actix_req.clone();
    response.dispatcher = Some(Arc::new(move |res: &Response| {
        let built = build_response(res, &cookie, &req_for_dispatcher);
        *slot.lock().unwrap() = Some(built);
        Box::pin(async {})
    }));

    server.dispatch(&mut request, &mut response).await;
    response.dispatch().await;

    dispatched
        .lock()
        .unwrap()
        .take()
        .unwrap_or_else(|| HttpResponse::InternalServerError().finish())
}

/// Start an `actix-web` server bound to every route `server` knows about
/// via a single catch-all service -- routing itself is decided by
/// `Server::dispatch`, not by `actix-web`'s own router, so there is
/// exactly one registered service per worker.
///
pub async fn serve(server: Arc<Server>, bind_addr: &str) -> std::io::Result<()> {
    let addr = bind_addr.to_string();
    ActixHttpServer::new(move || {
        let server = server.clone();
        App::new().default_service(web::route().to(
            move |req: HttpRequest, body: web::Bytes| {
                let server = server.clone();
                async move { handle(server, req, body).await }
            },
        ))
    })
    .bind(addr)?
    .run()
    .await
}

/// A ready-made `Gateway` (see `switchboard::config::Gateway`) that
/// `config.gateway` can be set to, so `Server::serve` starts this
/// adapter without the application hand-writing an `actix_web::App`.
///
pub fn gateway(bind_addr: impl Into<String>) -> switchboard::Gateway {
    let bind_addr = bind_addr.into();
    Arc::new(move |server: Arc<Server>| {
        let bind_addr = bind_addr.clone();
        Box::pin(async move { serve(server, &bind_addr).await })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urlencoded_style_query() {
        let map = parse_query("a=1&b=two");
        assert_eq!(map.get("a").unwrap(), "1");
        assert_eq!(map.get("b").unwrap(), "two");
    }

    #[test]
    fn extracts_multipart_text_fields_and_skips_files() {
        let body = concat!(
            "--boundary\r\n",
            "Content-Disposition: form-data; name=\"title\"\r\n\r\n",
            "hello\r\n",
            "--boundary\r\n",
            "Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\r\n",
            "binary-ish\r\n",
            "--boundary--\r\n"
        );
        let map = parse_multipart(body.as_bytes(), "boundary");
        assert_eq!(map.get("title").unwrap(), "hello");
        assert!(map.get("upload").is_none());
    }

    #[test]
    fn first_forwarded_value_wins() {
        assert_eq!(first_forwarded("https, http"), "https");
    }
}
