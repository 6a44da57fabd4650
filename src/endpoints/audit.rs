//! `gemini-audit`: free-form prompt passthrough for audit enhancement.
//!
//! The only endpoint that exposes raw generation parameters to the
//! client, and the only one serving cross-origin browsers (the audit
//! widget), so its route also answers CORS preflight. Response shape:
//! `{ "text": <text>, "response": <text> }`; the field is duplicated for
//! compatibility with the existing enhancer client.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::pipeline::PreparedRequest;
use crate::upstream::{ApiVersion, GenerationConfig};
use crate::{ProxyError, Result};

pub const ENDPOINT: &str = "gemini-audit";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const API_VERSION: ApiVersion = ApiVersion::V1Beta;
pub const CACHE_TTL: Duration = Duration::from_secs(10 * 60);
pub const CACHE_MAX_ENTRIES: usize = 500;
pub const RATE_MAX_REQUESTS: u32 = 8;
pub const RATE_WINDOW: Duration = Duration::from_secs(60);
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditRequest {
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub model: Option<String>,
}

impl Default for AuditRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            model: None,
        }
    }
}

/// Validate and prepare an audit request for dispatch.
pub fn prepare(body: AuditRequest) -> Result<PreparedRequest> {
    if body.prompt.is_empty() {
        return Err(ProxyError::MissingField("prompt"));
    }
    let fingerprint_fields = vec![
        body.prompt.clone(),
        body.temperature.to_string(),
        body.max_tokens.to_string(),
    ];
    Ok(PreparedRequest {
        prompt: body.prompt,
        generation: GenerationConfig::new(body.temperature, body.max_tokens),
        model_override: super::model_override(body.model),
        fingerprint_fields,
        render,
    })
}

fn render(text: &str) -> Result<serde_json::Value> {
    Ok(json!({ "text": text, "response": text }))
}
