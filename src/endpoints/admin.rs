//! `admin-generate`: typed content generation for the admin console.
//!
//! The request names a generation type and a bag of parameters; a pure
//! function maps each supported type to its instruction text and an
//! unsupported type is an explicit 400, never a fallthrough. This is the
//! one endpoint on the stable `v1` API path, and the one endpoint without
//! a per-request model override.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::pipeline::PreparedRequest;
use crate::upstream::{ApiVersion, GenerationConfig};
use crate::{ProxyError, Result};

pub const ENDPOINT: &str = "admin-generate";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const API_VERSION: ApiVersion = ApiVersion::V1;
pub const CACHE_TTL: Duration = Duration::from_secs(10 * 60);
pub const CACHE_MAX_ENTRIES: usize = 200;
pub const RATE_MAX_REQUESTS: u32 = 4;
pub const RATE_WINDOW: Duration = Duration::from_secs(60);
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(20);

const TEMPERATURE: f64 = 0.4;
const MAX_OUTPUT_TOKENS: u32 = 1200;

/// Request body. `params` is type-specific and deliberately loose.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub params: Value,
}

/// Validate and prepare an admin generation request for dispatch.
pub fn prepare(body: AdminRequest) -> Result<PreparedRequest> {
    if body.kind.is_empty() {
        return Err(ProxyError::MissingField("type"));
    }
    let instruction = build_instruction(&body.kind, &body.params)?;
    // serde_json orders object keys, so the serialized params are a stable
    // fingerprint component for logically identical requests.
    let fingerprint_fields = vec![body.kind.clone(), body.params.to_string()];
    Ok(PreparedRequest {
        prompt: instruction,
        generation: GenerationConfig::new(TEMPERATURE, MAX_OUTPUT_TOKENS),
        model_override: None,
        fingerprint_fields,
        render,
    })
}

fn render(text: &str) -> Result<Value> {
    Ok(json!({ "result": text }))
}

/// Map a generation type and its parameters to instruction text.
pub fn build_instruction(kind: &str, params: &Value) -> Result<String> {
    let instruction = match kind {
        "generateModule" => {
            let topic = str_param(params, "topic", "");
            let audience = str_param(params, "audience", "GBS leaders");
            let level = str_param(params, "level", "intermediate");
            let objectives = params
                .get("learningObjectives")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .unwrap_or_default();
            format!(
                "Create a training module for {audience} on the topic: {topic}.\n\
                 Level: {level}\n\
                 Learning objectives: {objectives}\n\
                 Return: Title, Overview (150-250 words), 3-5 Sections with bullet points, 3 Exercises, and a short Conclusion.\n\
                 Format as Markdown."
            )
        }
        "createQuiz" => {
            let topic = str_param(params, "topic", "");
            let count = u64_param(params, "count", 10);
            let difficulty = str_param(params, "difficulty", "mixed");
            format!(
                "Create {count} {difficulty}-difficulty multiple-choice quiz questions for: {topic}.\n\
                 Return JSON with keys: questions[{{ question, choices[4], answerIndex, rationale }}]."
            )
        }
        "writePrompts" => {
            let theme = str_param(params, "theme", "");
            let count = u64_param(params, "count", 10);
            let style = str_param(params, "style", "professional");
            format!(
                "Write {count} example AI prompts on the theme: {theme} in a {style} style.\n\
                 Return a numbered list; keep each under 2 lines."
            )
        }
        "summarize" => {
            let content = str_param(params, "content", "");
            let target = str_param(params, "target", "executive brief");
            format!(
                "Summarize the following content into an {target}.\n\
                 Be concise, structured, and preserve key facts.\n\
                 Content:\n---\n{content}\n---"
            )
        }
        "translateLevel" => {
            let content = str_param(params, "content", "");
            let level = str_param(params, "level", "beginner");
            format!(
                "Rewrite the following content for a {level}-level audience without losing core meaning.\n\
                 Content:\n---\n{content}\n---"
            )
        }
        "batch" => {
            let action = str_param(params, "action", "summarize");
            let items = params
                .get("items")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .enumerate()
                        .map(|(i, item)| format!("{}. {item}", i + 1))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default();
            format!(
                "Perform this action on each item and concatenate results separated by \n\n---\n\nAction: {action}\n\
                 Items:\n{items}"
            )
        }
        other => return Err(ProxyError::UnsupportedType(other.to_string())),
    };
    Ok(instruction)
}

fn str_param<'a>(params: &'a Value, key: &str, default: &'a str) -> &'a str {
    params.get(key).and_then(Value::as_str).unwrap_or(default)
}

fn u64_param(params: &Value, key: &str, default: u64) -> u64 {
    params.get(key).and_then(Value::as_u64).unwrap_or(default)
}
