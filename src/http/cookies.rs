//! Cookie plumbing for `_zar_sid`/`_zar_cid`/`_zar_pool` (spec.md §6
//! "Cookies"). Parses the raw `Cookie` header by hand (the teacher speaks
//! Postgres wire protocol, not HTTP, so this follows `xulek-RustSocks`'s
//! `cookie` crate usage instead) and builds `Set-Cookie` headers with the
//! two-label-suffix domain rule and per-cookie max-ages.

use axum::http::{HeaderMap, HeaderValue};
use cookie::{Cookie, SameSite};

use crate::config::Duration;
use crate::identity::ZarId;

pub const SID_COOKIE: &str = "_zar_sid";
pub const CID_COOKIE: &str = "_zar_cid";
pub const POOL_COOKIE: &str = "_zar_pool";

pub const SID_MAX_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 7);
pub const CID_MAX_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 2);

/// Read and url-decode a single named cookie out of the request's `Cookie`
/// header, ignoring malformed entries.
pub fn read_raw(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    for part in raw.split(';') {
        if let Ok(parsed) = Cookie::parse(part.trim().to_string()) {
            if parsed.name() == name {
                return Some(parsed.value().to_string());
            }
        }
    }
    None
}

pub fn read_zar_id(headers: &HeaderMap, name: &str) -> Option<ZarId> {
    ZarId::decode(&read_raw(headers, name)?).ok()
}

/// The two-label suffix of `host` (e.g. `a.b.example.com` -> `example.com`),
/// or `None` when cookies should be host-only (spec.md §6: disabled for the
/// literal hostname `testserver`, and for anything with fewer than two
/// labels — there's no suffix to take).
pub fn cookie_domain(host: &str) -> Option<String> {
    let host = host.split(':').next().unwrap_or(host);
    if host == "testserver" {
        return None;
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return None;
    }
    Some(labels[labels.len() - 2..].join("."))
}

/// Build a `Set-Cookie` header value per spec.md §6: `SameSite=None;
/// HttpOnly; Secure; Path=/`, with the resolved domain and max-age applied.
pub fn set_cookie_header(name: &str, value: &str, max_age: Duration, host: &str) -> HeaderValue {
    let mut builder = Cookie::build((name.to_string(), value.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(cookie::time::Duration::seconds(max_age.as_std().as_secs() as i64));
    if let Some(domain) = cookie_domain(host) {
        builder = builder.domain(domain);
    }
    let cookie = builder.build();
    HeaderValue::from_str(&cookie.to_string()).expect("cookie serializes to a valid header value")
}

pub fn zar_set_cookie(name: &str, id: &ZarId, max_age: Duration, host: &str) -> HeaderValue {
    set_cookie_header(name, &id.encode(), max_age, host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_strips_leftmost_label() {
        assert_eq!(cookie_domain("a.b.example.com"), Some("example.com".to_string()));
        assert_eq!(cookie_domain("example.com"), Some("example.com".to_string()));
    }

    #[test]
    fn testserver_and_bare_host_get_no_domain() {
        assert_eq!(cookie_domain("testserver"), None);
        assert_eq!(cookie_domain("localhost"), None);
    }

    #[test]
    fn reads_named_cookie_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("_zar_sid=abc123; _zar_cid=def456"),
        );
        assert_eq!(read_raw(&headers, "_zar_cid"), Some("def456".to_string()));
    }
}
