//! Telemetry metric name constants.
//!
//! Centralised metric names for heimdall operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `heimdall_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `endpoint` — proxy endpoint name (e.g. "gemini-audit")
//! - `model` — upstream model identifier
//! - `status` — outcome: "ok" or "error"

/// Total requests dispatched through a pipeline.
///
/// Labels: `endpoint`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "heimdall_requests_total";

/// Request duration in seconds, measured across the whole dispatch.
///
/// Labels: `endpoint`.
pub const REQUEST_DURATION_SECONDS: &str = "heimdall_request_duration_seconds";

/// Total response cache hits.
///
/// Labels: `endpoint`.
pub const CACHE_HITS_TOTAL: &str = "heimdall_cache_hits_total";

/// Total response cache misses.
///
/// Labels: `endpoint`.
pub const CACHE_MISSES_TOTAL: &str = "heimdall_cache_misses_total";

/// Total callers that joined an already in-flight upstream call.
///
/// Labels: `endpoint`.
pub const COALESCED_TOTAL: &str = "heimdall_coalesced_total";

/// Total requests rejected by the request gate's rate limiter.
///
/// Labels: `endpoint`.
pub const RATE_LIMITED_TOTAL: &str = "heimdall_rate_limited_total";

/// Total fallbacks from one candidate model to the next.
///
/// Labels: `endpoint`, `model` (the model that was given up on).
pub const FALLBACKS_TOTAL: &str = "heimdall_fallbacks_total";
