//! Upstream generative-language API client.
//!
//! [`GeminiClient`] speaks the `generateContent` wire protocol: a JSON
//! payload of user content plus generation parameters, the API key as a
//! query parameter, and a nested response the textual result is extracted
//! from. The [`GenerateBackend`] trait is the seam tests mock instead of
//! the network.
//!
//! Status classification happens here so the dispatcher only reasons
//! about error kinds: 429 becomes [`ProxyError::UpstreamRateLimited`]
//! (with the advertised retry delay when one can be found), 404/400
//! become [`ProxyError::ModelUnavailable`], any other non-2xx becomes
//! [`ProxyError::Upstream`].

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::cooldown;
use crate::{ProxyError, Result};

/// Default base URL for the generative-language API.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// API path version. Most endpoints use `v1beta`; admin generation uses
/// the stable `v1` surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V1Beta,
}

impl ApiVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V1Beta => "v1beta",
        }
    }
}

/// Generation parameters sent with every upstream call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub max_output_tokens: u32,
    /// Set to `application/json` to request strict-JSON output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

impl GenerationConfig {
    /// Standard parameters: the given temperature and token budget with
    /// the shared topK/topP constants.
    pub fn new(temperature: f64, max_output_tokens: u32) -> Self {
        Self {
            temperature,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens,
            response_mime_type: None,
        }
    }

    /// Request strict-JSON output from the model.
    pub fn json_mode(mut self) -> Self {
        self.response_mime_type = Some("application/json".to_string());
        self
    }
}

/// A prepared upstream call: the full prompt text, generation parameters,
/// and which API path version to hit.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub prompt: String,
    pub generation: GenerationConfig,
    pub api_version: ApiVersion,
}

/// The upstream seam. Implemented by [`GeminiClient`] for production and
/// by scripted mocks in tests.
#[async_trait]
pub trait GenerateBackend: Send + Sync {
    /// Issue a `generateContent` call for `model` and return the extracted
    /// text. An empty extraction is returned as an empty string; the
    /// dispatcher decides what that means.
    async fn generate_content(&self, model: &str, request: &UpstreamRequest) -> Result<String>;
}

#[derive(Serialize)]
struct GenerateContentPayload<'a> {
    contents: [Content<'a>; 1],
    #[serde(rename = "generationConfig")]
    generation_config: &'a GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// HTTP client for the generative-language API.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    /// Create a client against the production API.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, GEMINI_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        // No client-level timeout: the dispatcher bounds each call itself
        // with an endpoint-specific deadline.
        let http = Client::builder()
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    fn endpoint_url(&self, version: ApiVersion, model: &str) -> String {
        format!(
            "{}/{}/models/{}:generateContent",
            self.base_url,
            version.as_str(),
            model
        )
    }
}

#[async_trait]
impl GenerateBackend for GeminiClient {
    async fn generate_content(&self, model: &str, request: &UpstreamRequest) -> Result<String> {
        let payload = GenerateContentPayload {
            contents: [Content {
                role: "user",
                parts: [Part {
                    text: &request.prompt,
                }],
            }],
            generation_config: &request.generation,
        };

        let response = self
            .http
            .post(self.endpoint_url(request.api_version, model))
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProxyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(classify_error(model, status.as_u16(), details));
        }

        let data: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProxyError::Transport(format!("invalid upstream response: {e}")))?;

        Ok(extract_text(&data))
    }
}

/// Map a non-2xx upstream status to an error kind.
fn classify_error(model: &str, status: u16, details: String) -> ProxyError {
    match status {
        429 => {
            let retry_after = serde_json::from_str::<serde_json::Value>(&details)
                .ok()
                .as_ref()
                .and_then(cooldown::retry_delay);
            ProxyError::UpstreamRateLimited {
                model: model.to_string(),
                retry_after,
            }
        }
        404 | 400 => ProxyError::ModelUnavailable { status, details },
        _ => ProxyError::Upstream { status, details },
    }
}

/// Extract the first candidate's first text part, empty when absent.
fn extract_text(response: &GenerateContentResponse) -> String {
    response
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .and_then(|content| content.parts.first())
        .map(|part| part.text.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn payload_serializes_in_wire_shape() {
        let generation = GenerationConfig::new(0.4, 400);
        let payload = GenerateContentPayload {
            contents: [Content {
                role: "user",
                parts: [Part { text: "hello" }],
            }],
            generation_config: &generation,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hello");
        let config = &value["generationConfig"];
        assert_eq!(config["temperature"], 0.4);
        assert_eq!(config["topK"], 40);
        assert_eq!(config["topP"], 0.95);
        assert_eq!(config["maxOutputTokens"], 400);
        assert!(config.get("responseMimeType").is_none());
    }

    #[test]
    fn json_mode_sets_response_mime_type() {
        let generation = GenerationConfig::new(0.4, 800).json_mode();
        let value = serde_json::to_value(&generation).unwrap();
        assert_eq!(value["responseMimeType"], "application/json");
    }

    #[test]
    fn text_extraction_walks_the_nested_shape() {
        let body = r#"{
            "candidates": [
                { "content": { "parts": [ { "text": "result text" } ] } }
            ]
        }"#;
        let response: GenerateContentResponse = serde_json::from_str(body).unwrap();
        assert_eq!(extract_text(&response), "result text");
    }

    #[test]
    fn missing_candidates_extract_to_empty() {
        for body in [r#"{}"#, r#"{"candidates":[]}"#, r#"{"candidates":[{}]}"#] {
            let response: GenerateContentResponse = serde_json::from_str(body).unwrap();
            assert_eq!(extract_text(&response), "");
        }
    }

    #[test]
    fn classify_429_parses_retry_delay() {
        let details = r#"{"error":{"details":[{"retryDelay":"5s"}]}}"#;
        let err = classify_error("gemini-2.0-flash", 429, details.to_string());
        match err {
            ProxyError::UpstreamRateLimited { model, retry_after } => {
                assert_eq!(model, "gemini-2.0-flash");
                assert_eq!(retry_after, Some(Duration::from_secs(5)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn classify_429_without_hint_has_no_delay() {
        let err = classify_error("m", 429, "quota exceeded".to_string());
        assert!(matches!(
            err,
            ProxyError::UpstreamRateLimited {
                retry_after: None,
                ..
            }
        ));
    }

    #[test]
    fn classify_404_and_400_as_model_unavailable() {
        assert!(matches!(
            classify_error("m", 404, String::new()),
            ProxyError::ModelUnavailable { status: 404, .. }
        ));
        assert!(matches!(
            classify_error("m", 400, String::new()),
            ProxyError::ModelUnavailable { status: 400, .. }
        ));
        assert!(matches!(
            classify_error("m", 500, String::new()),
            ProxyError::Upstream { status: 500, .. }
        ));
    }

    #[test]
    fn endpoint_url_respects_api_version() {
        let client = GeminiClient::with_base_url("k", "http://127.0.0.1:1");
        assert_eq!(
            client.endpoint_url(ApiVersion::V1Beta, "gemini-2.0-flash"),
            "http://127.0.0.1:1/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(
            client.endpoint_url(ApiVersion::V1, "gemini-2.5-flash"),
            "http://127.0.0.1:1/v1/models/gemini-2.5-flash:generateContent"
        );
    }
}
