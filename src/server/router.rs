//! Route wiring and the per-endpoint handler glue.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;

use super::{AppState, respond};
use crate::config::Config;
use crate::endpoints::{admin, audit, gem, reverse};
use crate::upstream::GenerateBackend;
use crate::{ProxyError, Result};

/// Build the application router.
pub fn router(config: &Config, backend: Arc<dyn GenerateBackend>) -> axum::Router {
    let state = Arc::new(AppState::new(config, backend));
    axum::Router::new()
        .route(
            "/api/generate-gem",
            post(generate_gem).fallback(method_not_allowed),
        )
        .route(
            "/api/gemini-audit",
            post(gemini_audit)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/reverse-prompt",
            post(reverse_prompt).fallback(method_not_allowed),
        )
        .route(
            "/api/admin-generate",
            post(admin_generate).fallback(method_not_allowed),
        )
        .with_state(state)
}

async fn generate_gem(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Option<Json<gem::GemRequest>>,
) -> Response {
    let result = handle(&state.gem, &headers, peer(connect), body, gem::prepare).await;
    respond::proxy_response(result)
}

async fn gemini_audit(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Option<Json<audit::AuditRequest>>,
) -> Response {
    let result = handle(&state.audit, &headers, peer(connect), body, audit::prepare).await;
    let mut response = respond::proxy_response(result);
    apply_cors(&mut response);
    response
}

async fn reverse_prompt(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Option<Json<reverse::ReverseRequest>>,
) -> Response {
    let result = handle(&state.reverse, &headers, peer(connect), body, reverse::prepare).await;
    respond::proxy_response(result)
}

async fn admin_generate(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Option<Json<admin::AdminRequest>>,
) -> Response {
    let result = handle(&state.admin, &headers, peer(connect), body, admin::prepare).await;
    respond::proxy_response(result)
}

/// The shared handler flow: admission, preparation, dispatch.
///
/// A missing or undecodable body falls back to the endpoint's defaults;
/// required-field validation belongs to the endpoint's `prepare`, so
/// every 400 this proxy emits has the same error body shape.
async fn handle<B: Default, F>(
    endpoint: &super::Endpoint,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    body: Option<Json<B>>,
    prepare: F,
) -> Result<crate::pipeline::ProxyReply>
where
    F: FnOnce(B) -> Result<crate::pipeline::PreparedRequest>,
{
    endpoint.gate.admit(headers, peer)?;
    let body = body.map(|Json(inner)| inner).unwrap_or_default();
    let prepared = prepare(body)?;
    endpoint.pipeline.execute(prepared).await
}

/// CORS preflight for the audit widget.
async fn preflight() -> Response {
    let mut response = StatusCode::OK.into_response();
    apply_cors(&mut response);
    response
}

async fn method_not_allowed() -> Response {
    respond::error_response(&ProxyError::MethodNotAllowed)
}

/// The audit endpoint serves cross-origin browsers; everything else is
/// same-site only.
fn apply_cors(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(
        "access-control-allow-origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("Content-Type"),
    );
}

fn peer(connect: Option<ConnectInfo<SocketAddr>>) -> Option<SocketAddr> {
    connect.map(|ConnectInfo(addr)| addr)
}
