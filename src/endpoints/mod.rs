//! The four proxy endpoints.
//!
//! Each endpoint module contributes exactly what the shared pipeline
//! cannot know: its request body, its validation, its prompt-construction
//! step, its generation parameters, its fingerprint fields, its response
//! shape, and its pipeline constants (cache TTL/capacity, rate window,
//! upstream timeout, default model, API version). Everything else
//! (gating, caching, coalescing, cooldowns, fallback) lives in
//! [`crate::pipeline`].

pub mod admin;
pub mod audit;
pub mod gem;
pub mod reverse;

/// Normalise an optional per-request model override: trimmed, non-empty.
fn model_override(raw: Option<String>) -> Option<String> {
    raw.map(|m| m.trim().to_string()).filter(|m| !m.is_empty())
}
