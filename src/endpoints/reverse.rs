//! `reverse-prompt`: infer the prompt that could have produced a text.
//!
//! Asks the model for strict minified JSON (and additionally requests the
//! JSON response mode upstream), strips any code fences the model wraps
//! the payload in anyway, and re-shapes the parsed object into the fixed
//! five-key response. Unparseable output is a hard failure for the
//! attempt: it surfaces as 502 carrying the raw text, and no further
//! model is tried.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::pipeline::PreparedRequest;
use crate::upstream::{ApiVersion, GenerationConfig};
use crate::{ProxyError, Result};

pub const ENDPOINT: &str = "reverse-prompt";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const API_VERSION: ApiVersion = ApiVersion::V1Beta;
pub const CACHE_TTL: Duration = Duration::from_secs(30 * 60);
pub const CACHE_MAX_ENTRIES: usize = 200;
pub const RATE_MAX_REQUESTS: u32 = 4;
pub const RATE_WINDOW: Duration = Duration::from_secs(60);
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(20);

const TEMPERATURE: f64 = 0.4;
const MAX_OUTPUT_TOKENS: u32 = 800;

/// Request body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReverseRequest {
    pub text: String,
    pub model: Option<String>,
}

/// Validate and prepare a reverse-prompt request for dispatch.
pub fn prepare(body: ReverseRequest) -> Result<PreparedRequest> {
    if body.text.trim().is_empty() {
        return Err(ProxyError::MissingField("text"));
    }
    Ok(PreparedRequest {
        prompt: build_instruction(&body.text),
        generation: GenerationConfig::new(TEMPERATURE, MAX_OUTPUT_TOKENS).json_mode(),
        model_override: super::model_override(body.model),
        fingerprint_fields: vec![body.text],
        render,
    })
}

/// Shape the model's strict-JSON answer into the five-key response,
/// defaulting any key the model omitted.
fn render(text: &str) -> Result<Value> {
    let stripped = text.replace("```json", "").replace("```", "");
    let stripped = stripped.trim();
    let parsed: Value = serde_json::from_str(stripped).map_err(|_| {
        ProxyError::MalformedUpstreamOutput {
            raw: stripped.to_string(),
        }
    })?;
    Ok(json!({
        "generated_prompt": parsed.get("generated_prompt").and_then(Value::as_str).unwrap_or(""),
        "reasoning": parsed.get("reasoning").and_then(Value::as_str).unwrap_or(""),
        "optimization_tips": string_array(parsed.get("optimization_tips")),
        "examples": string_array(parsed.get("examples")),
        "use_cases": string_array(parsed.get("use_cases")),
    }))
}

fn string_array(value: Option<&Value>) -> Value {
    match value {
        Some(Value::Array(items)) => Value::Array(
            items
                .iter()
                .filter(|item| item.is_string())
                .cloned()
                .collect(),
        ),
        _ => json!([]),
    }
}

fn build_instruction(text: &str) -> String {
    format!(
        r#"You are an expert in prompt engineering and reverse-prompt analysis.
Analyze the provided text and infer the high-quality prompt that could have produced it.
Explain your reasoning, provide prompt optimization tips, and suggest practical examples and use cases.

Return ONLY strict minified JSON (no markdown, no backticks) with these keys:
{{
  "generated_prompt": string,
  "reasoning": string,
  "optimization_tips": string[],
  "examples": string[],
  "use_cases": string[]
}}

Guidelines:
- Include a clear role (e.g., "Act as ..."), task, context, audience, tone, and output format in generated_prompt when appropriate.
- Keep reasoning short but insightful.
- Provide 4-7 optimization_tips, 3-5 examples, and 4-7 use_cases.
- Use simple strings in the arrays (no nested objects).
- Do not include any text before or after the JSON.

Text to analyze:
---
{text}
---"#
    )
}
