//! Request gate: origin admission and per-client rate limiting.
//!
//! Sits in front of every endpoint pipeline. Origin policy: when a
//! configured allow-list is non-empty the request origin must be an exact
//! member; otherwise the origin's authority must equal the effective
//! request host (honouring a forwarded-host header). A missing or
//! unparseable origin is rejected outright.
//!
//! Rate limiting is a fixed window per client identity. The counter is
//! incremented before the threshold comparison, so the request that
//! crosses the limit still consumes a slot; a window therefore admits
//! exactly `max_requests` requests. Rejections report the time until the
//! window resets.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use axum::http::HeaderMap;
use tokio::time::Instant;

use crate::{ProxyError, Result};

/// Sentinel client identity when no address information is available.
const UNKNOWN_CLIENT: &str = "unknown";

struct Window {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window rate limiter keyed by client identity.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// Create a limiter admitting `max_requests` per `window` per client.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request from `client`. `Err` carries the time until the
    /// client's window resets.
    pub fn check(&self, client: &str) -> std::result::Result<(), Duration> {
        let mut clients = self.clients.lock().expect("rate limit lock poisoned");
        let now = Instant::now();
        let window = clients.entry(client.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + self.window,
        });
        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = now + self.window;
        }
        window.count += 1;
        if window.count > self.max_requests {
            Err(window.reset_at.duration_since(now))
        } else {
            Ok(())
        }
    }
}

/// Gate combining origin admission with rate limiting for one endpoint.
pub struct RequestGate {
    endpoint: &'static str,
    allowed_origins: Vec<String>,
    limiter: RateLimiter,
}

impl RequestGate {
    /// Create a gate for the named endpoint.
    pub fn new(
        endpoint: &'static str,
        allowed_origins: Vec<String>,
        max_requests: u32,
        window: Duration,
    ) -> Self {
        Self {
            endpoint,
            allowed_origins,
            limiter: RateLimiter::new(max_requests, window),
        }
    }

    /// Decide admission for a request. Origin is checked first, then the
    /// rate limit; a rejected request has still consumed a window slot.
    pub fn admit(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Result<()> {
        self.check_origin(headers)?;
        let client = client_id(headers, peer);
        self.limiter.check(&client).map_err(|retry_after| {
            metrics::counter!(crate::telemetry::RATE_LIMITED_TOTAL, "endpoint" => self.endpoint)
                .increment(1);
            tracing::debug!(endpoint = self.endpoint, %client, "rate limit exceeded");
            ProxyError::RateLimited { retry_after }
        })
    }

    fn check_origin(&self, headers: &HeaderMap) -> Result<()> {
        let origin = request_origin(headers).ok_or(ProxyError::OriginDenied)?;
        if !self.allowed_origins.is_empty() {
            if self.allowed_origins.iter().any(|allowed| *allowed == origin) {
                return Ok(());
            }
            return Err(ProxyError::OriginDenied);
        }
        let host = effective_host(headers).ok_or(ProxyError::OriginDenied)?;
        match origin_authority(&origin) {
            Some(authority) if authority == host => Ok(()),
            _ => Err(ProxyError::OriginDenied),
        }
    }
}

/// Derive the client identity: first entry of the forwarded-for chain,
/// else the raw connection address, else a literal sentinel.
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for")
        && let Some(first) = forwarded.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// The request origin: the `Origin` header, else the origin part of
/// `Referer`. `None` when neither yields a parseable origin.
fn request_origin(headers: &HeaderMap) -> Option<String> {
    if let Some(origin) = header_str(headers, "origin") {
        let origin = origin.trim();
        if origin_authority(origin).is_some() {
            return Some(origin.to_string());
        }
        return None;
    }
    let referer = header_str(headers, "referer")?;
    let scheme_end = referer.find("://")?;
    let rest = &referer[scheme_end + 3..];
    let authority_end = rest.find('/').unwrap_or(rest.len());
    if rest[..authority_end].is_empty() {
        return None;
    }
    Some(referer[..scheme_end + 3 + authority_end].to_string())
}

/// The `host[:port]` part of an origin, or `None` for opaque origins.
fn origin_authority(origin: &str) -> Option<&str> {
    let scheme_end = origin.find("://")?;
    let authority = &origin[scheme_end + 3..];
    (!authority.is_empty() && !authority.contains('/')).then_some(authority)
}

/// The host the client believes it is talking to: a forwarded-host header
/// when present, else `Host`.
fn effective_host(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-host")
        .or_else(|| header_str(headers, "host"))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    fn gate(allowed: &[&str], max: u32) -> RequestGate {
        RequestGate::new(
            "test",
            allowed.iter().map(|s| s.to_string()).collect(),
            max,
            Duration::from_secs(60),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn allow_list_requires_exact_membership() {
        let gate = gate(&["https://hub.test"], 10);
        assert!(
            gate.admit(&headers(&[("origin", "https://hub.test")]), None)
                .is_ok()
        );
        assert!(matches!(
            gate.admit(&headers(&[("origin", "https://evil.test")]), None),
            Err(ProxyError::OriginDenied)
        ));
        assert!(matches!(
            gate.admit(&headers(&[("origin", "https://hub.test.evil.test")]), None),
            Err(ProxyError::OriginDenied)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_origin_is_denied() {
        let gate = gate(&["https://hub.test"], 10);
        assert!(matches!(
            gate.admit(&headers(&[]), None),
            Err(ProxyError::OriginDenied)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn referer_substitutes_for_origin() {
        let gate = gate(&["https://hub.test"], 10);
        let result = gate.admit(
            &headers(&[("referer", "https://hub.test/workshops/index.html")]),
            None,
        );
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_allow_list_falls_back_to_same_origin() {
        let gate = gate(&[], 10);
        let same = headers(&[("origin", "https://hub.test"), ("host", "hub.test")]);
        assert!(gate.admit(&same, None).is_ok());

        let forwarded = headers(&[
            ("origin", "https://hub.test"),
            ("host", "internal.lan"),
            ("x-forwarded-host", "hub.test"),
        ]);
        assert!(gate.admit(&forwarded, None).is_ok());

        let cross = headers(&[("origin", "https://elsewhere.test"), ("host", "hub.test")]);
        assert!(matches!(
            gate.admit(&cross, None),
            Err(ProxyError::OriginDenied)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn opaque_origin_is_denied() {
        let gate = gate(&[], 10);
        let map = headers(&[("origin", "null"), ("host", "hub.test")]);
        assert!(matches!(
            gate.admit(&map, None),
            Err(ProxyError::OriginDenied)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn window_admits_exactly_max_requests() {
        let limiter = RateLimiter::new(4, Duration::from_secs(60));
        for _ in 0..4 {
            assert!(limiter.check("1.2.3.4").is_ok());
        }
        let retry_after = limiter.check("1.2.3.4").unwrap_err();
        assert!(retry_after > Duration::ZERO);
        assert!(retry_after <= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn window_reset_restores_admission() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("c").is_ok());
        assert!(limiter.check("c").is_ok());
        assert!(limiter.check("c").is_err());

        tokio::time::advance(Duration::from_secs(61)).await;
        // Counter restarts at 1 for the first request of the new window.
        assert!(limiter.check("c").is_ok());
        assert!(limiter.check("c").is_ok());
        assert!(limiter.check("c").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn clients_are_limited_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("b").is_ok());
        assert!(limiter.check("a").is_err());
    }

    #[test]
    fn client_id_prefers_forwarded_for_chain_head() {
        let map = headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);
        assert_eq!(client_id(&map, None), "203.0.113.9");
    }

    #[test]
    fn client_id_falls_back_to_peer_then_sentinel() {
        let peer: SocketAddr = "192.0.2.4:55123".parse().unwrap();
        assert_eq!(client_id(&headers(&[]), Some(peer)), "192.0.2.4");
        assert_eq!(client_id(&headers(&[]), None), "unknown");
    }
}
