//! Request/response capture for the `api_request_logs` table.
//!
//! The middleware builds a `NewApiLog` per request and hands it to a bounded
//! channel; `ApiLogWorker` drains the channel into the database. A full
//! channel drops the entry instead of holding up the response.

use crate::{error::AppError, AppState};
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use configuration::ApiLoggingSettings;
use database::{DbRepository, NewApiLog};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};

const TRUNCATION_MARKER: &str = "... [truncated]";
const REDACTED: &str = "[REDACTED]";

/// Body and query keys whose values never reach the log table.
const SENSITIVE_KEYS: [&str; 7] = [
    "password",
    "password_confirmation",
    "current_password",
    "new_password",
    "token",
    "access_token",
    "refresh_token",
];

#[derive(Debug, Clone)]
pub struct ApiLogger {
    settings: ApiLoggingSettings,
    tx: mpsc::Sender<NewApiLog>,
}

impl ApiLogger {
    /// Creates the logger and the receiving end its worker consumes.
    pub fn new(settings: ApiLoggingSettings) -> (Self, mpsc::Receiver<NewApiLog>) {
        let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
        (Self { settings, tx }, rx)
    }

    pub fn settings(&self) -> &ApiLoggingSettings {
        &self.settings
    }

    pub fn should_log(&self, path: &str, method: &Method) -> bool {
        if !self.settings.enabled {
            return false;
        }
        if self
            .settings
            .exclude_paths
            .iter()
            .any(|excluded| !excluded.is_empty() && path.contains(excluded.as_str()))
        {
            return false;
        }
        !self
            .settings
            .exclude_methods
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(method.as_str()))
    }

    pub fn should_record_status(&self, status: StatusCode) -> bool {
        !self.settings.log_only_errors || status.as_u16() >= 400
    }

    /// Empty bodies become `None`; long ones are cut at `truncate_body_at`
    /// characters.
    pub fn truncate_body(&self, body: &str) -> Option<String> {
        if body.is_empty() {
            return None;
        }
        let limit = self.settings.truncate_body_at;
        if body.chars().count() <= limit {
            return Some(body.to_string());
        }
        let mut cut: String = body.chars().take(limit).collect();
        cut.push_str(TRUNCATION_MARKER);
        Some(cut)
    }

    /// Queues an entry without waiting. Returns whether it was accepted.
    pub fn submit(&self, entry: NewApiLog) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(TrySendError::Full(entry)) => {
                tracing::warn!(path = %entry.path, "API log channel full, dropping entry.");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("API log worker has stopped, dropping entry.");
                false
            }
        }
    }
}

/// Drains queued entries into `api_request_logs`.
pub struct ApiLogWorker {
    repo: DbRepository,
}

impl ApiLogWorker {
    pub fn new(repo: DbRepository) -> Self {
        Self { repo }
    }

    /// Runs until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<NewApiLog>) {
        tracing::info!("API log worker started");

        while let Some(entry) = rx.recv().await {
            match self.repo.insert_api_log(&entry).await {
                Ok(id) => tracing::trace!(log_id = id, path = %entry.path, "API request logged"),
                Err(e) => tracing::error!(error = ?e, "Failed to write API log entry"),
            }
        }

        tracing::info!("API log channel closed, worker stopping");
    }
}

/// `Client-IP`, then the first `X-Forwarded-For` hop, then the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(ip) = header_value("client-ip") {
        return ip.to_string();
    }
    if let Some(forwarded) = header_value("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|hop| !hop.is_empty()) {
            return first.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Request headers as a JSON object. Credentials are redacted.
pub fn headers_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for (name, value) in headers {
        let value = if name == header::AUTHORIZATION || name == header::COOKIE {
            REDACTED.to_string()
        } else {
            String::from_utf8_lossy(value.as_bytes()).into_owned()
        };
        map.insert(name.as_str().to_string(), Value::String(value));
    }
    Value::Object(map)
}

fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                if is_sensitive(key) {
                    *inner = Value::String(REDACTED.to_string());
                } else {
                    redact_value(inner);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {}
    }
}

/// Body text with credential fields masked. JSON and urlencoded bodies are
/// rewritten; anything else is kept as is.
pub fn redact_body(body: &[u8]) -> String {
    if let Ok(mut value) = serde_json::from_slice::<Value>(body) {
        redact_value(&mut value);
        return value.to_string();
    }

    let text = String::from_utf8_lossy(body);
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(text.as_bytes())
        .into_owned()
        .collect();
    if !pairs.iter().any(|(key, _)| is_sensitive(key)) {
        return text.into_owned();
    }
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in &pairs {
        let value = if is_sensitive(key) { REDACTED } else { value.as_str() };
        form.append_pair(key, value);
    }
    form.finish()
}

/// Decoded query parameters; `None` without a query string.
pub fn query_params_json(query: Option<&str>) -> Option<Value> {
    let query = query.filter(|q| !q.is_empty())?;
    let map: Map<String, Value> = url::form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| {
            let value = if is_sensitive(&key) {
                REDACTED.to_string()
            } else {
                value.into_owned()
            };
            (key.into_owned(), Value::String(value))
        })
        .collect();
    Some(Value::Object(map))
}

/// The envelope's `message`, falling back to the status reason.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Server error").to_string())
}

fn elapsed_ms(started: Instant) -> Decimal {
    let micros = i64::try_from(started.elapsed().as_micros()).unwrap_or(i64::MAX);
    Decimal::new(micros, 3).round_dp(2)
}

/// Records every API request that passes the logger's filters.
pub async fn log_requests(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let logger = &state.api_logger;
    let path = request.uri().path().to_string();
    let method = request.method().clone();
    if !logger.should_log(&path, &method) {
        return next.run(request).await;
    }

    let started = Instant::now();
    let settings = logger.settings();
    let uri = request.uri().to_string();
    let query_string = request.uri().query().map(str::to_string);
    let headers = request.headers().clone();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let (parts, body) = request.into_parts();
    let request_body = if settings.log_request_body {
        match to_bytes(body, state.settings.server.body_limit_bytes).await {
            Ok(bytes) => bytes,
            Err(_) => return AppError::PayloadTooLarge.into_response(),
        }
    } else {
        // The body is passed through untouched.
        let response = next.run(Request::from_parts(parts, body)).await;
        return finish(
            &state, started, method, uri, path, query_string, &headers, peer, None, response,
        )
        .await;
    };

    let logged_body = logger.truncate_body(&redact_body(&request_body));
    let response = next
        .run(Request::from_parts(parts, Body::from(request_body)))
        .await;
    finish(
        &state, started, method, uri, path, query_string, &headers, peer, logged_body, response,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn finish(
    state: &AppState,
    started: Instant,
    method: Method,
    uri: String,
    path: String,
    query_string: Option<String>,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    request_body: Option<String>,
    response: Response,
) -> Response {
    let logger = &state.api_logger;
    let settings = logger.settings();
    let status = response.status();
    if !logger.should_record_status(status) {
        return response;
    }

    let is_error = status.as_u16() >= 400;
    let needs_body = settings.log_response_body || status.is_server_error();
    let (response, response_bytes) = if needs_body {
        let (parts, body) = response.into_parts();
        match to_bytes(body, usize::MAX).await {
            Ok(bytes) => (Response::from_parts(parts, Body::from(bytes.clone())), bytes),
            Err(e) => {
                tracing::warn!(error = %e, "Could not buffer response body for API log.");
                (Response::from_parts(parts, Body::empty()), Bytes::new())
            }
        }
    } else {
        (response, Bytes::new())
    };

    let entry = NewApiLog {
        method: method.to_string(),
        uri,
        path,
        query_params: if settings.log_query_params {
            query_params_json(query_string.as_deref())
        } else {
            None
        },
        query_string,
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ip_address: client_ip(headers, peer),
        user_id: state.jwt.user_id_from_headers(headers),
        headers: settings.log_headers.then(|| headers_json(headers)),
        body: request_body,
        status_code: i32::from(status.as_u16()),
        response_body: if settings.log_response_body {
            logger.truncate_body(&redact_body(&response_bytes))
        } else {
            None
        },
        duration_ms: elapsed_ms(started),
        is_error,
        error_message: status
            .is_server_error()
            .then(|| error_message(status, &response_bytes)),
        created_at: Utc::now(),
    };
    logger.submit(entry);

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn logger(configure: impl FnOnce(&mut ApiLoggingSettings)) -> (ApiLogger, mpsc::Receiver<NewApiLog>) {
        let mut settings = ApiLoggingSettings::default();
        configure(&mut settings);
        ApiLogger::new(settings)
    }

    fn entry(path: &str) -> NewApiLog {
        NewApiLog {
            method: "GET".to_string(),
            uri: path.to_string(),
            path: path.to_string(),
            query_string: None,
            user_agent: None,
            ip_address: "unknown".to_string(),
            user_id: None,
            headers: None,
            body: None,
            query_params: None,
            status_code: 200,
            response_body: None,
            duration_ms: Decimal::ZERO,
            is_error: false,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn exclusions() {
        let (logger, _rx) = logger(|s| s.exclude_methods = vec!["options".to_string()]);
        assert!(logger.should_log("/api/v1/courses", &Method::GET));
        assert!(!logger.should_log("/api/health", &Method::GET));
        assert!(!logger.should_log("/api/v1/ping", &Method::GET));
        assert!(!logger.should_log("/api/v1/courses", &Method::OPTIONS));

        let (disabled, _rx) = self::logger(|s| s.enabled = false);
        assert!(!disabled.should_log("/api/v1/courses", &Method::GET));
    }

    #[test]
    fn only_errors_mode() {
        let (logger, _rx) = logger(|s| s.log_only_errors = true);
        assert!(!logger.should_record_status(StatusCode::OK));
        assert!(logger.should_record_status(StatusCode::NOT_FOUND));
        let (all, _rx) = self::logger(|_| {});
        assert!(all.should_record_status(StatusCode::OK));
    }

    #[test]
    fn bodies_are_truncated_by_characters() {
        let (logger, _rx) = logger(|s| s.truncate_body_at = 5);
        assert_eq!(logger.truncate_body(""), None);
        assert_eq!(logger.truncate_body("hello").as_deref(), Some("hello"));
        assert_eq!(
            logger.truncate_body("héllo world").as_deref(),
            Some("héllo... [truncated]")
        );
    }

    #[test]
    fn client_ip_precedence() {
        let peer: SocketAddr = "10.0.0.9:5123".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, None), "unknown");
        assert_eq!(client_ip(&headers, Some(peer)), "10.0.0.9");
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.7");
        headers.insert("client-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_ip(&headers, Some(peer)), "198.51.100.2");
    }

    #[test]
    fn authorization_is_redacted() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let json = headers_json(&headers);
        assert_eq!(json["authorization"], "[REDACTED]");
        assert_eq!(json["accept"], "application/json");
    }

    #[test]
    fn credentials_are_masked_in_json_bodies() {
        let login = br#"{"login":"thandi","password":"Secret123"}"#;
        let logged: Value = serde_json::from_str(&redact_body(login)).unwrap();
        assert_eq!(logged, json!({"login": "thandi", "password": "[REDACTED]"}));

        let issued = br#"{"success":true,"data":{"token":"eyJhbGciOi","token_type":"Bearer","user":{"id":4}}}"#;
        let logged: Value = serde_json::from_str(&redact_body(issued)).unwrap();
        assert_eq!(logged["data"]["token"], "[REDACTED]");
        assert_eq!(logged["data"]["token_type"], "Bearer");
        assert_eq!(logged["data"]["user"]["id"], 4);
    }

    #[test]
    fn credentials_are_masked_in_form_bodies() {
        let logged = redact_body(b"username=sipho&password=Robotics2026&password_confirmation=Robotics2026");
        assert!(!logged.contains("Robotics2026"));
        assert!(logged.contains("username=sipho"));
        assert!(logged.contains("password=%5BREDACTED%5D"));
        assert_eq!(redact_body(b"plain text"), "plain text");
    }

    #[test]
    fn query_params_decode() {
        assert_eq!(query_params_json(None), None);
        assert_eq!(query_params_json(Some("")), None);
        assert_eq!(
            query_params_json(Some("search=robot%20club&page=2")),
            Some(json!({"search": "robot club", "page": "2"}))
        );
        assert_eq!(
            query_params_json(Some("token=abc")),
            Some(json!({"token": "[REDACTED]"}))
        );
    }

    #[test]
    fn server_error_message_comes_from_envelope() {
        let body = br#"{"success":false,"message":"An internal database error occurred"}"#;
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, body),
            "An internal database error occurred"
        );
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, b"upstream down"),
            "Bad Gateway"
        );
    }

    #[tokio::test]
    async fn full_channel_drops_entries() {
        let (logger, mut rx) = logger(|s| s.channel_capacity = 1);
        assert!(logger.submit(entry("/api/v1/courses")));
        assert!(!logger.submit(entry("/api/v1/programs")));
        assert_eq!(rx.recv().await.unwrap().path, "/api/v1/courses");
        drop(rx);
        assert!(!logger.submit(entry("/api/v1/users")));
    }
}
