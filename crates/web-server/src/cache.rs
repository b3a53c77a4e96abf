//! HTTP caching headers: ETags, `Cache-Control` policies per endpoint and
//! conditional `304 Not Modified` responses.

use crate::{error::AppError, AppState};
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Directives that make up a `Cache-Control` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_age: Option<u32>,
    pub s_maxage: Option<u32>,
    pub private: bool,
    pub public: bool,
    pub no_cache: bool,
    pub no_store: bool,
    pub must_revalidate: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: None,
            s_maxage: None,
            private: false,
            public: true,
            no_cache: false,
            no_store: false,
            must_revalidate: false,
        }
    }
}

impl CacheConfig {
    fn uncacheable() -> Self {
        Self {
            no_cache: true,
            no_store: true,
            ..Self::default()
        }
    }
}

/// Hex SHA-256 of the body, quoted. Weak validators get the `W/` prefix.
pub fn generate_etag(body: &[u8], weak: bool) -> String {
    let hash = hex::encode(Sha256::digest(body));
    if weak {
        format!("W/\"{}\"", hash)
    } else {
        format!("\"{}\"", hash)
    }
}

/// Strips the weak prefix and quotes. An empty value yields `None`.
pub fn parse_etag(value: &str) -> Option<String> {
    let value = value.trim();
    let value = value.strip_prefix("W/").unwrap_or(value);
    let value = value.trim_matches('"');
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// The bytes an ETag is computed over. Envelope timestamps change on every
/// response, so they are left out of the validator.
pub fn etag_source(body: &[u8]) -> Cow<'_, [u8]> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(mut envelope)) => {
            if envelope.remove("timestamp").is_some() {
                Cow::Owned(Value::Object(envelope).to_string().into_bytes())
            } else {
                Cow::Borrowed(body)
            }
        }
        _ => Cow::Borrowed(body),
    }
}

pub fn etags_match(a: &str, b: &str) -> bool {
    match (parse_etag(a), parse_etag(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Renders the directives in a fixed order.
pub fn cache_control(config: &CacheConfig) -> String {
    let mut directives = Vec::new();
    if config.no_cache {
        directives.push("no-cache".to_string());
    }
    if config.no_store {
        directives.push("no-store".to_string());
    }
    if config.private {
        directives.push("private".to_string());
    } else if config.public {
        directives.push("public".to_string());
    }
    if let Some(max_age) = config.max_age {
        directives.push(format!("max-age={}", max_age));
    }
    if let Some(s_maxage) = config.s_maxage {
        directives.push(format!("s-maxage={}", s_maxage));
    }
    if config.must_revalidate {
        directives.push("must-revalidate".to_string());
    }
    directives.join(", ")
}

const COLLECTIONS: [&str; 3] = ["users", "courses", "programs"];

fn is_collection(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .is_some_and(|last| COLLECTIONS.contains(&last))
}

fn is_collection_item(path: &str) -> bool {
    let mut segments = path.rsplit('/');
    match (segments.next(), segments.next()) {
        (Some(id), Some(collection)) => {
            !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) && COLLECTIONS.contains(&collection)
        }
        _ => false,
    }
}

/// Picks the caching policy for an endpoint.
pub fn cache_config_for(path: &str, method: &Method) -> CacheConfig {
    if method != Method::GET {
        return CacheConfig::uncacheable();
    }
    if path.contains("/users/me") || path.contains("/profile") {
        return CacheConfig {
            private: true,
            max_age: Some(300),
            must_revalidate: true,
            ..CacheConfig::default()
        };
    }
    if is_collection(path) {
        return CacheConfig {
            max_age: Some(60),
            s_maxage: Some(300),
            ..CacheConfig::default()
        };
    }
    if is_collection_item(path) {
        return CacheConfig {
            max_age: Some(600),
            s_maxage: Some(1800),
            ..CacheConfig::default()
        };
    }
    if path.contains("/auth/") {
        return CacheConfig {
            private: true,
            ..CacheConfig::uncacheable()
        };
    }
    CacheConfig {
        max_age: Some(300),
        must_revalidate: true,
        ..CacheConfig::default()
    }
}

pub fn should_cache(path: &str, method: &Method) -> bool {
    if method != Method::GET || path.contains("/auth/") {
        return false;
    }
    let admin_write = path.contains("/admin/")
        && ["create", "update", "delete"].iter().any(|verb| path.contains(verb));
    !admin_write
}

pub fn is_cacheable_status(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        200 | 203 | 204 | 206 | 300 | 301 | 404 | 405 | 410 | 414 | 501
    )
}

pub fn invalidate_cache() -> &'static str {
    "no-cache, no-store, must-revalidate, max-age=0"
}

/// IMF-fixdate, e.g. `Thu, 09 Jan 2026 12:00:00 GMT`.
pub fn format_last_modified(at: DateTime<Utc>) -> String {
    at.format(IMF_FIXDATE).to_string()
}

pub fn parse_if_modified_since(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), IMF_FIXDATE)
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn was_modified_since(last_modified: DateTime<Utc>, since: DateTime<Utc>) -> bool {
    last_modified > since
}

pub fn vary() -> &'static str {
    "Accept, Accept-Encoding, Authorization"
}

/// Stable key for an endpoint, its query parameters and the caller.
pub fn cache_key(path: &str, params: &BTreeMap<String, String>, user_id: Option<i64>) -> String {
    let mut parts = json!({ "endpoint": path, "params": params });
    if let Some(user_id) = user_id {
        parts["user"] = json!(user_id);
    }
    hex::encode(Sha256::digest(parts.to_string().as_bytes()))
}

fn insert(headers: &mut HeaderMap, name: header::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

fn apply_no_cache(headers: &mut HeaderMap) {
    insert(headers, header::CACHE_CONTROL, invalidate_cache());
    insert(headers, header::PRAGMA, "no-cache");
    insert(headers, header::EXPIRES, "0");
}

/// Adds validators and caching headers to API responses, answering a
/// matching `If-None-Match` with `304 Not Modified`.
pub async fn http_cache(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    if !state.settings.cache.enabled {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let if_none_match = request
        .headers()
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let response = next.run(request).await;

    if !should_cache(&path, &method) || !is_cacheable_status(response.status()) {
        let mut response = response;
        apply_no_cache(response.headers_mut());
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return AppError::Internal(format!("failed to buffer response body: {}", e)).into_response();
        }
    };

    let etag = generate_etag(&etag_source(&bytes), false);
    let config = cache_config_for(&path, &method);
    insert(&mut parts.headers, header::ETAG, &etag);
    insert(&mut parts.headers, header::CACHE_CONTROL, &cache_control(&config));
    insert(&mut parts.headers, header::LAST_MODIFIED, &format_last_modified(Utc::now()));
    insert(&mut parts.headers, header::VARY, vary());

    if if_none_match.is_some_and(|candidate| etags_match(&candidate, &etag)) {
        tracing::debug!(%path, "ETag matched, responding 304.");
        parts.status = StatusCode::NOT_MODIFIED;
        parts.headers.remove(header::CONTENT_LENGTH);
        parts.headers.remove(header::CONTENT_TYPE);
        return Response::from_parts(parts, Body::empty());
    }

    Response::from_parts(parts, Body::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn etags_are_quoted_sha256() {
        let strong = generate_etag(b"hello", false);
        assert_eq!(
            strong,
            "\"2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824\""
        );
        let weak = generate_etag(b"hello", true);
        assert!(weak.starts_with("W/\""));
        assert!(etags_match(&strong, &weak));
    }

    #[test]
    fn envelope_timestamps_do_not_change_the_tag() {
        let first = br#"{"success":true,"status_code":200,"message":"pong","timestamp":"2026-01-09T12:00:00.123456789Z","data":{"pong":true}}"#;
        let second = br#"{"success":true,"status_code":200,"message":"pong","timestamp":"2026-01-09T12:00:01.987654321Z","data":{"pong":true}}"#;
        assert_eq!(
            generate_etag(&etag_source(first), false),
            generate_etag(&etag_source(second), false)
        );

        let changed = br#"{"success":true,"status_code":200,"message":"pong","timestamp":"2026-01-09T12:00:01Z","data":{"pong":false}}"#;
        assert_ne!(
            generate_etag(&etag_source(first), false),
            generate_etag(&etag_source(changed), false)
        );
        assert_eq!(&*etag_source(b"OK"), b"OK");
    }

    #[test]
    fn parse_and_match_etags() {
        assert_eq!(parse_etag("W/\"abc\"").as_deref(), Some("abc"));
        assert_eq!(parse_etag("\"\""), None);
        assert!(!etags_match("", ""));
        assert!(!etags_match("\"a\"", "\"b\""));
    }

    #[test]
    fn cache_control_directive_order() {
        let config = CacheConfig {
            max_age: Some(60),
            s_maxage: Some(300),
            must_revalidate: true,
            ..CacheConfig::default()
        };
        assert_eq!(cache_control(&config), "public, max-age=60, s-maxage=300, must-revalidate");

        let private = CacheConfig {
            private: true,
            ..CacheConfig::uncacheable()
        };
        assert_eq!(cache_control(&private), "no-cache, no-store, private");
    }

    #[test]
    fn policies_by_endpoint() {
        let get = Method::GET;
        assert_eq!(
            cache_control(&cache_config_for("/api/v1/courses", &Method::POST)),
            "no-cache, no-store, public"
        );
        assert_eq!(
            cache_control(&cache_config_for("/api/v1/users/me", &get)),
            "private, max-age=300, must-revalidate"
        );
        assert_eq!(
            cache_control(&cache_config_for("/api/v1/programs", &get)),
            "public, max-age=60, s-maxage=300"
        );
        assert_eq!(
            cache_control(&cache_config_for("/api/v1/courses/42", &get)),
            "public, max-age=600, s-maxage=1800"
        );
        assert_eq!(
            cache_control(&cache_config_for("/api/v1/auth/login", &get)),
            "no-cache, no-store, private"
        );
        assert_eq!(
            cache_control(&cache_config_for("/api/v1/courses/42/progress", &get)),
            "public, max-age=300, must-revalidate"
        );
    }

    #[test]
    fn should_cache_rules() {
        assert!(should_cache("/api/v1/courses", &Method::GET));
        assert!(!should_cache("/api/v1/courses", &Method::POST));
        assert!(!should_cache("/api/v1/auth/login", &Method::GET));
        assert!(!should_cache("/api/v1/admin/users/delete", &Method::GET));
        assert!(should_cache("/api/v1/admin/users", &Method::GET));
    }

    #[test]
    fn cacheable_statuses() {
        assert!(is_cacheable_status(StatusCode::OK));
        assert!(is_cacheable_status(StatusCode::NOT_FOUND));
        assert!(!is_cacheable_status(StatusCode::CREATED));
        assert!(!is_cacheable_status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn last_modified_round_trip() {
        let at = Utc.with_ymd_and_hms(2026, 1, 9, 12, 0, 0).unwrap();
        let formatted = format_last_modified(at);
        assert_eq!(formatted, "Fri, 09 Jan 2026 12:00:00 GMT");
        assert_eq!(parse_if_modified_since(&formatted), Some(at));
        assert_eq!(parse_if_modified_since("yesterday"), None);
        assert!(was_modified_since(at, at - chrono::Duration::seconds(1)));
        assert!(!was_modified_since(at, at));
    }

    #[test]
    fn cache_key_ignores_param_order() {
        let mut a = BTreeMap::new();
        a.insert("page".to_string(), "2".to_string());
        a.insert("status".to_string(), "active".to_string());
        let mut b = BTreeMap::new();
        b.insert("status".to_string(), "active".to_string());
        b.insert("page".to_string(), "2".to_string());
        assert_eq!(cache_key("/courses", &a, None), cache_key("/courses", &b, None));
        assert_ne!(cache_key("/courses", &a, None), cache_key("/courses", &a, Some(1)));
        assert_eq!(cache_key("/courses", &a, None).len(), 64);
    }
}
