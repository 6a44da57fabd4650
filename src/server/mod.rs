//! HTTP server: application state, routing, and response formatting.
//!
//! One [`AppState`] owns a gated pipeline per endpoint, all sharing a
//! single upstream backend and one cooldown tracker (a model's quota is
//! global to the API key, whichever route exhausted it). Handlers are
//! thin: gate, prepare, execute, format.

mod respond;
mod router;

pub use respond::{CACHE_STATUS_HEADER, UPSTREAM_MODEL_HEADER};
pub use router::router;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::cooldown::CooldownTracker;
use crate::endpoints::{admin, audit, gem, reverse};
use crate::gate::RequestGate;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::upstream::{ApiVersion, GenerateBackend};

/// One endpoint's gate and pipeline.
pub struct Endpoint {
    pub gate: RequestGate,
    pub pipeline: Pipeline,
}

/// Shared application state: the four gated endpoint pipelines.
pub struct AppState {
    pub gem: Endpoint,
    pub audit: Endpoint,
    pub reverse: Endpoint,
    pub admin: Endpoint,
}

struct EndpointParams {
    endpoint: &'static str,
    default_model: &'static str,
    api_version: ApiVersion,
    cache_ttl: Duration,
    cache_max_entries: usize,
    rate_max_requests: u32,
    rate_window: Duration,
    upstream_timeout: Duration,
}

impl AppState {
    /// Assemble the endpoint pipelines over a shared backend.
    pub fn new(config: &Config, backend: Arc<dyn GenerateBackend>) -> Self {
        let cooldowns = Arc::new(CooldownTracker::new());
        let build = |params: EndpointParams| {
            let default_model = config
                .primary_model
                .clone()
                .unwrap_or_else(|| params.default_model.to_string());
            Endpoint {
                gate: RequestGate::new(
                    params.endpoint,
                    config.allowed_origins.clone(),
                    params.rate_max_requests,
                    params.rate_window,
                ),
                pipeline: Pipeline::new(
                    Arc::clone(&backend),
                    Arc::clone(&cooldowns),
                    PipelineConfig {
                        endpoint: params.endpoint,
                        default_model,
                        extra_fallback_models: config.extra_fallback_models.clone(),
                        cache_ttl: params.cache_ttl,
                        cache_max_entries: params.cache_max_entries,
                        upstream_timeout: params.upstream_timeout,
                        api_version: params.api_version,
                    },
                ),
            }
        };

        Self {
            gem: build(EndpointParams {
                endpoint: gem::ENDPOINT,
                default_model: gem::DEFAULT_MODEL,
                api_version: gem::API_VERSION,
                cache_ttl: gem::CACHE_TTL,
                cache_max_entries: gem::CACHE_MAX_ENTRIES,
                rate_max_requests: gem::RATE_MAX_REQUESTS,
                rate_window: gem::RATE_WINDOW,
                upstream_timeout: gem::UPSTREAM_TIMEOUT,
            }),
            audit: build(EndpointParams {
                endpoint: audit::ENDPOINT,
                default_model: audit::DEFAULT_MODEL,
                api_version: audit::API_VERSION,
                cache_ttl: audit::CACHE_TTL,
                cache_max_entries: audit::CACHE_MAX_ENTRIES,
                rate_max_requests: audit::RATE_MAX_REQUESTS,
                rate_window: audit::RATE_WINDOW,
                upstream_timeout: audit::UPSTREAM_TIMEOUT,
            }),
            reverse: build(EndpointParams {
                endpoint: reverse::ENDPOINT,
                default_model: reverse::DEFAULT_MODEL,
                api_version: reverse::API_VERSION,
                cache_ttl: reverse::CACHE_TTL,
                cache_max_entries: reverse::CACHE_MAX_ENTRIES,
                rate_max_requests: reverse::RATE_MAX_REQUESTS,
                rate_window: reverse::RATE_WINDOW,
                upstream_timeout: reverse::UPSTREAM_TIMEOUT,
            }),
            admin: build(EndpointParams {
                endpoint: admin::ENDPOINT,
                default_model: admin::DEFAULT_MODEL,
                api_version: admin::API_VERSION,
                cache_ttl: admin::CACHE_TTL,
                cache_max_entries: admin::CACHE_MAX_ENTRIES,
                rate_max_requests: admin::RATE_MAX_REQUESTS,
                rate_window: admin::RATE_WINDOW,
                upstream_timeout: admin::UPSTREAM_TIMEOUT,
            }),
        }
    }
}
