//! Heimdall - coalescing proxy gateway for the Gemini generative-language API
//!
//! This crate fronts a small set of prompt-generation endpoints with one
//! shared request pipeline: per-client rate limiting, response caching
//! with TTL and bounded capacity, in-flight request coalescing, per-model
//! cooldown tracking, and ordered fallback across candidate upstream
//! models. Each endpoint contributes only its configuration, its prompt
//! construction, and its response shape.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use heimdall::{Config, GeminiClient};
//!
//! #[tokio::main]
//! async fn main() -> heimdall::Result<()> {
//!     let config = Config::from_env()?;
//!     let backend = Arc::new(GeminiClient::new(config.api_key.clone()));
//!     let app = heimdall::server::router(&config, backend);
//!
//!     let listener = tokio::net::TcpListener::bind(&config.address)
//!         .await
//!         .expect("failed to bind");
//!     axum::serve(
//!         listener,
//!         app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//!     )
//!     .await
//!     .expect("server error");
//!     Ok(())
//! }
//! ```
//!
//! # State model
//!
//! All pipeline state (cache, in-flight table, rate-limit windows,
//! cooldowns) lives in process memory and is owned by the server
//! instance. Horizontally scaled deployments hold independent state per
//! instance; the rate limiter, cache, and cooldown tracker are therefore
//! only approximately global. This is an accepted property of the
//! deployment model, not an oversight.

pub mod cache;
pub mod coalesce;
pub mod config;
pub mod cooldown;
pub mod endpoints;
pub mod error;
pub mod fingerprint;
pub mod gate;
pub mod pipeline;
pub mod server;
pub mod telemetry;
pub mod upstream;

// Re-export main types at crate root
pub use config::Config;
pub use error::{ProxyError, Result};
pub use pipeline::{CacheStatus, Pipeline, PipelineConfig, PreparedRequest, ProxyReply};
pub use upstream::{ApiVersion, GeminiClient, GenerateBackend, GenerationConfig};
