//! Per-model cooldown tracking for upstream rate limits.
//!
//! When the upstream answers 429 for a model, that model is placed on
//! cooldown for the advertised retry delay and the dispatcher skips it
//! without attempting a call until the deadline passes. Entries become
//! irrelevant once their deadline elapses; they are not actively deleted.
//!
//! Shared across every endpoint pipeline: an upstream model's quota is
//! global to the API key, not to the route that exhausted it.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::time::Instant;

/// Fallback retry-after when the upstream advertised no delay.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Thread-safe tracker of per-model cooldown deadlines.
///
/// `RwLock` because reads happen on every dispatch while writes only
/// happen on upstream rate limits.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    deadlines: RwLock<HashMap<String, Instant>>,
}

impl CooldownTracker {
    /// Create a tracker with no models on cooldown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `model` on cooldown for `delay`, overwriting any earlier
    /// deadline.
    pub fn set(&self, model: &str, delay: Duration) {
        let mut deadlines = self.deadlines.write().expect("cooldown lock poisoned");
        deadlines.insert(model.to_string(), Instant::now() + delay);
    }

    /// Remaining cooldown for `model`, or `None` when it may be attempted.
    pub fn remaining(&self, model: &str) -> Option<Duration> {
        let deadlines = self.deadlines.read().expect("cooldown lock poisoned");
        let deadline = deadlines.get(model)?;
        let remaining = deadline.duration_since(Instant::now());
        (remaining > Duration::ZERO).then_some(remaining)
    }
}

/// Extract an advertised retry delay from an upstream error payload.
///
/// The upstream does not contractually fix where the hint lives (Google
/// nests it inside `error.details` RetryInfo blocks), so the payload is
/// searched recursively for a `retryDelay` field holding either a
/// `"<N>s"` string or a bare number of seconds.
pub fn retry_delay(payload: &serde_json::Value) -> Option<Duration> {
    match payload {
        serde_json::Value::Object(map) => {
            if let Some(value) = map.get("retryDelay")
                && let Some(delay) = parse_delay(value)
            {
                return Some(delay);
            }
            map.values().find_map(retry_delay)
        }
        serde_json::Value::Array(items) => items.iter().find_map(retry_delay),
        _ => None,
    }
}

fn parse_delay(value: &serde_json::Value) -> Option<Duration> {
    let seconds = match value {
        serde_json::Value::String(s) => s.trim().trim_end_matches('s').parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    if seconds <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn fresh_model_has_no_cooldown() {
        let tracker = CooldownTracker::new();
        assert_eq!(tracker.remaining("gemini-2.0-flash"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_counts_down_and_expires() {
        let tracker = CooldownTracker::new();
        tracker.set("gemini-2.0-flash", Duration::from_secs(5));

        let remaining = tracker.remaining("gemini-2.0-flash").unwrap();
        assert_eq!(remaining, Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(3)).await;
        let remaining = tracker.remaining("gemini-2.0-flash").unwrap();
        assert_eq!(remaining, Duration::from_secs(2));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(tracker.remaining("gemini-2.0-flash"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn models_cool_down_independently() {
        let tracker = CooldownTracker::new();
        tracker.set("a", Duration::from_secs(10));
        assert!(tracker.remaining("a").is_some());
        assert!(tracker.remaining("b").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn later_set_overwrites_deadline() {
        let tracker = CooldownTracker::new();
        tracker.set("a", Duration::from_secs(60));
        tracker.set("a", Duration::from_secs(5));
        assert_eq!(tracker.remaining("a"), Some(Duration::from_secs(5)));
    }

    #[test]
    fn retry_delay_from_top_level_field() {
        let payload = json!({ "retryDelay": "7s" });
        assert_eq!(retry_delay(&payload), Some(Duration::from_secs(7)));
    }

    #[test]
    fn retry_delay_from_nested_retry_info() {
        // Shape used by the upstream's RetryInfo error detail.
        let payload = json!({
            "error": {
                "code": 429,
                "message": "Resource has been exhausted",
                "details": [
                    { "@type": "type.googleapis.com/google.rpc.ErrorInfo" },
                    {
                        "@type": "type.googleapis.com/google.rpc.RetryInfo",
                        "retryDelay": "13s"
                    }
                ]
            }
        });
        assert_eq!(retry_delay(&payload), Some(Duration::from_secs(13)));
    }

    #[test]
    fn retry_delay_accepts_fractional_and_numeric_forms() {
        assert_eq!(
            retry_delay(&json!({ "retryDelay": "2.5s" })),
            Some(Duration::from_millis(2500))
        );
        assert_eq!(
            retry_delay(&json!({ "retryDelay": 4 })),
            Some(Duration::from_secs(4))
        );
    }

    #[test]
    fn retry_delay_absent_or_garbage_is_none() {
        assert_eq!(retry_delay(&json!({ "error": "quota" })), None);
        assert_eq!(retry_delay(&json!({ "retryDelay": "soon" })), None);
        assert_eq!(retry_delay(&json!({ "retryDelay": "-3s" })), None);
        assert_eq!(retry_delay(&json!("429")), None);
    }
}
