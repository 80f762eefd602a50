//! Cookie parsing and `Set-Cookie` serialisation for the session write
//! log.
//!
//! `switchboard::Response::session` is an append-only list of
//! `set(name, value)`/`remove(name)` revisions; this module is the
//! concrete serialiser an adapter needs to turn that log into wire
//! headers (domain/expires/httpOnly/maxAge/path/priority/sameSite/secure).
//!

use actix_web::cookie::time::{Duration, OffsetDateTime};
use actix_web::cookie::{Cookie, CookieBuilder, SameSite as AxSameSite};
use std::collections::HashMap;
use switchboard::{CookieOptions, CookiePriority, Response, SameSite, SessionRevision};

/// Parse an incoming `Cookie` header into a flat name->value map, the
/// shape `Request::session` expects.
///
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for part in header.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
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
            SameSite::True | SameSite::Strict => AxSameSite::Strict,
            SameSite::Lax => AxSameSite::Lax,
            SameSite::None => AxSameSite::None,
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

/// Replay every revision recorded on `res.session` into `Set-Cookie`
/// header values, in the order they were written.
///
pub fn session_headers(res: &Response, opts: &CookieOptions) -> Vec<String> {
    res.session
        .iter()
        .map(|revision| match revision {
            SessionRevision::Set(name, value) => set_cookie_header(name, value, opts),
            SessionRevision::Remove(name) => remove_cookie_header(name, opts),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_cookie_header() {
        let map = parse_cookie_header("a=1; b=2");
        assert_eq!(map.get("a").unwrap(), "1");
        assert_eq!(map.get("b").unwrap(), "2");
    }

    #[test]
    fn remove_sets_epoch_expiry() {
        let header = remove_cookie_header("sid", &CookieOptions::default());
        assert!(header.contains("sid="));
        assert!(header.to_lowercase().contains("expires="));
    }

    #[test]
    fn set_carries_configured_attributes() {
        let mut opts = CookieOptions::default();
        opts.secure = true;
        opts.same_site = Some(SameSite::Strict);
        let header = set_cookie_header("sid", "abc", &opts);
        assert!(header.contains("sid=abc"));
        assert!(header.contains("Secure"));
        assert!(header.contains("SameSite=Strict"));
    }
}
