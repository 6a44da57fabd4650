//! `generate-gem`: craft a polished, CREATE-style prompt (a "Gem").
//!
//! Accepts loosely filled persona/task/context/audience/tone/format
//! fields plus an optional seed prompt, and asks the model for a single
//! copy-ready prompt with no framework section labels. Response shape:
//! `{ "gem": <text> }`.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::Result;
use crate::pipeline::PreparedRequest;
use crate::upstream::{ApiVersion, GenerationConfig};

pub const ENDPOINT: &str = "generate-gem";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const API_VERSION: ApiVersion = ApiVersion::V1Beta;
pub const CACHE_TTL: Duration = Duration::from_secs(15 * 60);
pub const CACHE_MAX_ENTRIES: usize = 300;
pub const RATE_MAX_REQUESTS: u32 = 6;
pub const RATE_WINDOW: Duration = Duration::from_secs(60);
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(15);

const TEMPERATURE: f64 = 0.4;
const MAX_OUTPUT_TOKENS: u32 = 400;

/// Request body. Every field defaults to empty; the prompt builder infers
/// sensible content for missing fields rather than rejecting them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GemRequest {
    pub persona: String,
    pub task: String,
    pub context: String,
    pub audience: String,
    pub tone: String,
    pub format: String,
    pub seed: String,
    pub model: Option<String>,
}

/// Validate and prepare a gem request for dispatch.
pub fn prepare(body: GemRequest) -> Result<PreparedRequest> {
    let fingerprint_fields = vec![
        body.persona.clone(),
        body.task.clone(),
        body.context.clone(),
        body.audience.clone(),
        body.tone.clone(),
        body.format.clone(),
        body.seed.clone(),
    ];
    Ok(PreparedRequest {
        prompt: build_instruction(&body),
        generation: GenerationConfig::new(TEMPERATURE, MAX_OUTPUT_TOKENS),
        model_override: super::model_override(body.model),
        fingerprint_fields,
        render,
    })
}

fn render(text: &str) -> Result<serde_json::Value> {
    Ok(json!({ "gem": text }))
}

fn build_instruction(body: &GemRequest) -> String {
    format!(
        r#"You are an expert prompt engineer for Google Gemini.
Craft a single, polished prompt (a "Gem") using the CREATE framework internally, but OUTPUT a clean, unified prompt WITHOUT any section labels (no Title/C/R/E/A/T/E labels). The result must be copy-ready, concise, and clearly structured so a user immediately sees value yet can edit easily.

Desired shape of the final text (no labels):
- Begin with a short, task-focused title line.
- Immediately follow with an instruction paragraph that includes the role ("Act as..."), context, and the core task.
- Provide 3-6 numbered constraints/steps (expectations) as a single list.
- Include a single sentence clarifying the intended audience.
- Include one concise sentence for tone/style.
- End with an explicit Output Format block (Markdown section list or a fenced code block with schema) so responses are consistent.

Rules:
- DO NOT include any explicit section labels like "Title", "C — Context", etc.
- Be directive and specific; avoid filler.
- Keep the total length focused; only expand if the Output Format needs it.
- If some fields are missing, infer sensible defaults without inventing domain-specific facts.
- If seed text is provided, harmonize phrasing and terminology with it.
- Return ONLY the final prompt text (no commentary).

Fields:
Persona: {persona}
Task: {task}
Context: {context}
Audience: {audience}
Tone: {tone}
Format: {format}

Seed prompt (optional): {seed}"#,
        persona = body.persona,
        task = body.task,
        context = body.context,
        audience = body.audience,
        tone = body.tone,
        format = body.format,
        seed = body.seed,
    )
}
