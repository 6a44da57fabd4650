//! The shared proxy request pipeline.
//!
//! One parametrized [`Pipeline`] replaces what were four near-identical
//! request handlers. Each endpoint contributes a [`PipelineConfig`] and a
//! [`PreparedRequest`] (prompt, generation parameters, fingerprint fields,
//! response shaping); the pipeline owns everything else: candidate-model
//! ordering, cooldown skips, cache lookups, in-flight coalescing, the
//! bounded-timeout upstream call, error classification, and fallback.
//!
//! # Dispatch state machine
//!
//! For each candidate model in order:
//!
//! ```text
//! COOLDOWN_SKIP → try next candidate
//! CACHE_HIT     → return (status HIT)
//! COALESCE_HIT  → await the in-flight call, return (status COALESCED)
//! CALL          → SUCCESS                   → cache, return (status MISS)
//!                 RATE_LIMITED (429)        → set cooldown, try next
//!                 NOT_FOUND_OR_BAD_REQUEST  → try next (502 if exhausted)
//!                 EMPTY_RESPONSE            → try next, nothing cached
//!                 OTHER_ERROR               → surface immediately
//! ```
//!
//! Exhaustion with a rate-limit as the last failure (or with every
//! candidate cooling down) yields 429 carrying the smallest remaining
//! cooldown actually encountered; otherwise the last error surfaces.
//!
//! All pipeline state is process-local. Under horizontal scaling each
//! instance rate-limits, caches, and cools down independently; the
//! approximation is accepted, not hidden.

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheConfig, CachedReply, ResponseCache};
use crate::coalesce::{DispatchResult, InFlightTable};
use crate::cooldown::{CooldownTracker, DEFAULT_RETRY_AFTER};
use crate::fingerprint::fingerprint;
use crate::telemetry;
use crate::upstream::{ApiVersion, GenerateBackend, GenerationConfig, UpstreamRequest};
use crate::{ProxyError, Result};

/// Fallback models tried after the primary, before any configured extras.
pub const DEFAULT_FALLBACK_MODELS: [&str; 2] = ["gemini-2.0-flash", "gemini-1.5-flash"];

/// Per-endpoint pipeline parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Endpoint name; part of every fingerprint and metric label.
    pub endpoint: &'static str,
    /// Primary model when the request carries no override.
    pub default_model: String,
    /// Extra fallback models appended after [`DEFAULT_FALLBACK_MODELS`].
    pub extra_fallback_models: Vec<String>,
    /// Response cache time-to-live.
    pub cache_ttl: Duration,
    /// Response cache capacity.
    pub cache_max_entries: usize,
    /// Deadline for a single upstream call.
    pub upstream_timeout: Duration,
    /// API path version for upstream calls.
    pub api_version: ApiVersion,
}

/// A validated request, ready for dispatch.
///
/// Built by an endpoint's `prepare` function. `render` shapes the
/// extracted upstream text into the endpoint's response body; it is a
/// plain function pointer so prepared requests stay cheaply cloneable
/// into the coalescer's shared future.
#[derive(Clone)]
pub struct PreparedRequest {
    /// Full prompt text sent upstream.
    pub prompt: String,
    /// Generation parameters sent upstream.
    pub generation: GenerationConfig,
    /// Per-request model override, already trimmed and non-empty.
    pub model_override: Option<String>,
    /// Semantically relevant request fields, in a fixed order.
    pub fingerprint_fields: Vec<String>,
    /// Maps extracted upstream text to the endpoint's response body.
    pub render: fn(&str) -> Result<serde_json::Value>,
}

/// How the response body was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Coalesced,
}

impl CacheStatus {
    /// Header value for the cache-status diagnostic.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Coalesced => "COALESCED",
        }
    }
}

/// A successful dispatch: the response body, the model that produced it,
/// and how it was obtained.
#[derive(Debug, Clone)]
pub struct ProxyReply {
    pub body: serde_json::Value,
    pub model: String,
    pub cache: CacheStatus,
}

/// The parametrized proxy pipeline for one endpoint.
///
/// Owns the endpoint's cache and in-flight table; shares the backend and
/// the cooldown tracker with every other endpoint (an upstream model's
/// quota is global to the key).
pub struct Pipeline {
    backend: Arc<dyn GenerateBackend>,
    cooldowns: Arc<CooldownTracker>,
    cache: Arc<ResponseCache>,
    in_flight: InFlightTable,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline from its configuration and shared collaborators.
    pub fn new(
        backend: Arc<dyn GenerateBackend>,
        cooldowns: Arc<CooldownTracker>,
        config: PipelineConfig,
    ) -> Self {
        let cache = Arc::new(ResponseCache::new(
            config.endpoint,
            CacheConfig {
                ttl: config.cache_ttl,
                max_entries: config.cache_max_entries,
            },
        ));
        Self {
            backend,
            cooldowns,
            cache,
            in_flight: InFlightTable::new(),
            config,
        }
    }

    /// The ordered, de-duplicated candidate model list for a request:
    /// explicit override, configured primary, the hardcoded fallbacks,
    /// then configured extras. Order is first-seen.
    pub fn candidate_models(&self, model_override: Option<&str>) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        let mut push = |model: &str| {
            if !model.is_empty() && !candidates.iter().any(|seen| seen == model) {
                candidates.push(model.to_string());
            }
        };
        if let Some(model) = model_override {
            push(model);
        }
        push(&self.config.default_model);
        for model in DEFAULT_FALLBACK_MODELS {
            push(model);
        }
        for model in &self.config.extra_fallback_models {
            push(model);
        }
        candidates
    }

    /// Dispatch a prepared request through the candidate chain.
    #[instrument(skip_all, fields(endpoint = self.config.endpoint))]
    pub async fn execute(&self, prepared: PreparedRequest) -> Result<ProxyReply> {
        let started = std::time::Instant::now();
        let result = self.dispatch(prepared).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "endpoint" => self.config.endpoint,
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "endpoint" => self.config.endpoint,
        )
        .record(started.elapsed().as_secs_f64());
        result
    }

    async fn dispatch(&self, prepared: PreparedRequest) -> Result<ProxyReply> {
        let candidates = self.candidate_models(prepared.model_override.as_deref());
        let mut min_cooldown: Option<Duration> = None;
        let mut last_err: Option<ProxyError> = None;

        for model in &candidates {
            if let Some(remaining) = self.cooldowns.remaining(model) {
                debug!(%model, remaining_secs = remaining.as_secs(), "model cooling down, skipping");
                min_cooldown = Some(min_cooldown.map_or(remaining, |m| m.min(remaining)));
                continue;
            }

            let fields: Vec<&str> = prepared
                .fingerprint_fields
                .iter()
                .map(String::as_str)
                .collect();
            let key = fingerprint(self.config.endpoint, model, &fields);

            if let Some(cached) = self.cache.get(key) {
                return Ok(ProxyReply {
                    body: cached.body,
                    model: cached.model,
                    cache: CacheStatus::Hit,
                });
            }

            let attempt = self.attempt(model.clone(), prepared.clone(), key);
            let (result, joined) = self.in_flight.run(key, attempt).await;

            match result {
                Ok(reply) => {
                    if joined {
                        metrics::counter!(telemetry::COALESCED_TOTAL,
                            "endpoint" => self.config.endpoint,
                        )
                        .increment(1);
                    }
                    return Ok(ProxyReply {
                        body: reply.body,
                        model: reply.model,
                        cache: if joined {
                            CacheStatus::Coalesced
                        } else {
                            CacheStatus::Miss
                        },
                    });
                }
                Err(err) if err.allows_fallback() => {
                    if let ProxyError::UpstreamRateLimited { model, retry_after } = &err {
                        let remaining = self
                            .cooldowns
                            .remaining(model)
                            .or(*retry_after)
                            .unwrap_or(DEFAULT_RETRY_AFTER);
                        min_cooldown = Some(min_cooldown.map_or(remaining, |m| m.min(remaining)));
                    }
                    warn!(%model, error = %err, "candidate model failed, trying next");
                    metrics::counter!(telemetry::FALLBACKS_TOTAL,
                        "endpoint" => self.config.endpoint,
                        "model" => model.clone(),
                    )
                    .increment(1);
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        // Candidates exhausted. A trailing rate limit (or a chain of pure
        // cooldown skips) surfaces as 429 with the smallest cooldown seen;
        // anything else surfaces as the last recorded failure.
        match last_err {
            Some(ProxyError::UpstreamRateLimited { .. }) | None => Err(ProxyError::RateLimited {
                retry_after: min_cooldown.unwrap_or(DEFAULT_RETRY_AFTER),
            }),
            Some(err) => Err(err),
        }
    }

    /// The single-model call future registered with the in-flight table.
    ///
    /// Owns everything it touches so coalesced waiters can share it.
    /// Write-through caching happens here, before settlement, so waiters
    /// and later callers observe the identical body.
    fn attempt(
        &self,
        model: String,
        prepared: PreparedRequest,
        key: u64,
    ) -> BoxFuture<'static, DispatchResult> {
        let backend = Arc::clone(&self.backend);
        let cooldowns = Arc::clone(&self.cooldowns);
        let cache = Arc::clone(&self.cache);
        let timeout = self.config.upstream_timeout;
        let api_version = self.config.api_version;

        async move {
            let request = UpstreamRequest {
                prompt: prepared.prompt,
                generation: prepared.generation,
                api_version,
            };

            let outcome =
                tokio::time::timeout(timeout, backend.generate_content(&model, &request)).await;

            let text = match outcome {
                Err(_) => {
                    return Err(ProxyError::Transport(format!(
                        "upstream call timed out after {}s",
                        timeout.as_secs()
                    )));
                }
                Ok(Err(ProxyError::UpstreamRateLimited { model, retry_after })) => {
                    let delay = retry_after.unwrap_or(DEFAULT_RETRY_AFTER);
                    cooldowns.set(&model, delay);
                    return Err(ProxyError::UpstreamRateLimited {
                        model,
                        retry_after: Some(delay),
                    });
                }
                Ok(Err(err)) => return Err(err),
                Ok(Ok(text)) => text,
            };

            if text.is_empty() {
                return Err(ProxyError::EmptyResponse);
            }

            let body = (prepared.render)(&text)?;
            cache.insert(
                key,
                CachedReply {
                    body: body.clone(),
                    model: model.clone(),
                },
            );
            Ok(CachedReply { body, model })
        }
        .boxed()
    }
}
