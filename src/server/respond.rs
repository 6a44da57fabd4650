//! Response formatting: pipeline outcomes to HTTP responses.
//!
//! Success responses carry the endpoint body plus two diagnostic headers
//! (`x-cache-status`, `x-upstream-model`). Error responses use the fixed
//! `{error, details?, retryAfterSeconds?}` shape, with `Retry-After` set
//! whenever the status is 429 and `Allow` on 405. Upstream diagnostic
//! text is passed through where safe; secrets are never echoed.

use axum::Json;
use axum::http::header::{ALLOW, RETRY_AFTER};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};

use crate::pipeline::ProxyReply;
use crate::{ProxyError, Result};

/// Header reporting how the body was obtained: HIT, MISS, or COALESCED.
pub const CACHE_STATUS_HEADER: &str = "x-cache-status";
/// Header reporting which upstream model produced the body.
pub const UPSTREAM_MODEL_HEADER: &str = "x-upstream-model";

/// Convert a pipeline outcome into an HTTP response.
pub fn proxy_response(result: Result<ProxyReply>) -> Response {
    match result {
        Ok(reply) => success_response(reply),
        Err(err) => error_response(&err),
    }
}

fn success_response(reply: ProxyReply) -> Response {
    let mut response = (StatusCode::OK, Json(reply.body)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        CACHE_STATUS_HEADER,
        HeaderValue::from_static(reply.cache.as_str()),
    );
    if let Ok(model) = HeaderValue::from_str(&reply.model) {
        headers.insert(UPSTREAM_MODEL_HEADER, model);
    }
    response
}

/// Render an error with its outward status, body, and headers.
pub fn error_response(err: &ProxyError) -> Response {
    let status =
        StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut body = Map::new();
    body.insert("error".to_string(), Value::String(error_label(err)));
    if let Some(details) = error_details(err) {
        body.insert("details".to_string(), Value::String(details));
    }
    if let ProxyError::MalformedUpstreamOutput { raw } = err {
        body.insert("raw".to_string(), Value::String(raw.clone()));
    }
    let retry_after = err.retry_after().map(retry_after_seconds);
    if let Some(seconds) = retry_after {
        body.insert("retryAfterSeconds".to_string(), json!(seconds));
    }

    let mut response = (status, Json(Value::Object(body))).into_response();
    let headers = response.headers_mut();
    if let Some(seconds) = retry_after {
        headers.insert(RETRY_AFTER, HeaderValue::from(seconds));
    }
    if matches!(err, ProxyError::MethodNotAllowed) {
        headers.insert(ALLOW, HeaderValue::from_static("POST"));
    }
    response
}

/// Whole seconds until retry, rounded up and never zero.
fn retry_after_seconds(duration: std::time::Duration) -> u64 {
    (duration.as_secs_f64().ceil() as u64).max(1)
}

fn error_label(err: &ProxyError) -> String {
    match err {
        ProxyError::MethodNotAllowed => "Method Not Allowed".to_string(),
        ProxyError::OriginDenied => "Forbidden".to_string(),
        ProxyError::MissingField(field) => format!("Missing required field: {field}"),
        ProxyError::UnsupportedType(_) => "Invalid type or params".to_string(),
        ProxyError::RateLimited { .. } | ProxyError::UpstreamRateLimited { .. } => {
            "Rate limit exceeded".to_string()
        }
        ProxyError::ModelUnavailable { .. } | ProxyError::Upstream { .. } => {
            "Gemini API error".to_string()
        }
        ProxyError::EmptyResponse => "Empty response from Gemini".to_string(),
        ProxyError::MalformedUpstreamOutput { .. } => "Invalid JSON from Gemini".to_string(),
        ProxyError::Transport(_) => "Server error".to_string(),
        ProxyError::Configuration(message) => message.clone(),
    }
}

fn error_details(err: &ProxyError) -> Option<String> {
    match err {
        ProxyError::ModelUnavailable { details, .. } | ProxyError::Upstream { details, .. } => {
            (!details.is_empty()).then(|| details.clone())
        }
        ProxyError::Transport(details) => Some(details.clone()),
        ProxyError::UnsupportedType(kind) => Some(format!("unsupported type: {kind}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::CacheStatus;
    use std::time::Duration;

    #[test]
    fn success_carries_diagnostic_headers() {
        let response = proxy_response(Ok(ProxyReply {
            body: json!({ "gem": "text" }),
            model: "gemini-2.0-flash".to_string(),
            cache: CacheStatus::Coalesced,
        }));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CACHE_STATUS_HEADER).unwrap(),
            "COALESCED"
        );
        assert_eq!(
            response.headers().get(UPSTREAM_MODEL_HEADER).unwrap(),
            "gemini-2.0-flash"
        );
    }

    #[test]
    fn rate_limited_sets_retry_after_header() {
        let response = error_response(&ProxyError::RateLimited {
            retry_after: Duration::from_millis(2400),
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        // Rounded up to whole seconds.
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "3");
    }

    #[test]
    fn method_not_allowed_sets_allow_header() {
        let response = error_response(&ProxyError::MethodNotAllowed);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(ALLOW).unwrap(), "POST");
    }

    #[test]
    fn upstream_404_surfaces_as_502() {
        let response = error_response(&ProxyError::ModelUnavailable {
            status: 404,
            details: "model not found".to_string(),
        });
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn retry_after_is_never_zero() {
        assert_eq!(retry_after_seconds(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_seconds(Duration::ZERO), 1);
        assert_eq!(retry_after_seconds(Duration::from_secs(30)), 30);
    }
}
