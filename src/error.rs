//! Heimdall error types

use std::time::Duration;

/// Heimdall error types.
///
/// The enum is `Clone` so that callers coalesced onto a shared in-flight
/// call all observe the same failure value. For that reason upstream parse
/// failures carry the offending text rather than a source error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProxyError {
    // Client errors
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("origin not allowed")]
    OriginDenied,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unsupported generation type: {0}")]
    UnsupportedType(String),

    // Rate limiting
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Upstream 429 for a specific model. Never surfaced directly: the
    /// dispatcher records a cooldown and falls back, converting to
    /// [`ProxyError::RateLimited`] only once every candidate is exhausted.
    #[error("upstream rate limited model '{model}'")]
    UpstreamRateLimited {
        model: String,
        retry_after: Option<Duration>,
    },

    // Upstream errors
    /// Upstream 404/400: the model name is invalid or unavailable for this
    /// key. Triggers fallback; remapped to 502 outward so the proxy's own
    /// routes never appear missing.
    #[error("model not available ({status}): {details}")]
    ModelUnavailable { status: u16, details: String },

    #[error("upstream error ({status}): {details}")]
    Upstream { status: u16, details: String },

    #[error("empty response from model")]
    EmptyResponse,

    #[error("malformed structured output from model")]
    MalformedUpstreamOutput { raw: String },

    // Transport errors (timeout, network failure)
    #[error("transport error: {0}")]
    Transport(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ProxyError {
    /// The outward HTTP status for this error.
    ///
    /// Upstream 404/400 are remapped to 502: surfacing them verbatim would
    /// make the proxy's own route look missing or misused.
    pub fn status(&self) -> u16 {
        match self {
            Self::MethodNotAllowed => 405,
            Self::OriginDenied => 403,
            Self::MissingField(_) | Self::UnsupportedType(_) => 400,
            Self::RateLimited { .. } | Self::UpstreamRateLimited { .. } => 429,
            Self::ModelUnavailable { .. } => 502,
            Self::Upstream { status, .. } => match *status {
                404 | 400 => 502,
                s => s,
            },
            Self::EmptyResponse | Self::MalformedUpstreamOutput { .. } => 502,
            Self::Transport(_) | Self::Configuration(_) => 500,
        }
    }

    /// Retry-after hint, when this error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            Self::UpstreamRateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether the dispatcher may try the next candidate model after this
    /// error. Everything else is terminal for the whole request.
    pub(crate) fn allows_fallback(&self) -> bool {
        matches!(
            self,
            Self::UpstreamRateLimited { .. } | Self::ModelUnavailable { .. } | Self::EmptyResponse
        )
    }
}

/// Result type alias for Heimdall operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_client_statuses_remap_to_502() {
        let not_found = ProxyError::Upstream {
            status: 404,
            details: "no such model".into(),
        };
        let bad_request = ProxyError::Upstream {
            status: 400,
            details: "bad payload".into(),
        };
        let server_error = ProxyError::Upstream {
            status: 503,
            details: "overloaded".into(),
        };
        assert_eq!(not_found.status(), 502);
        assert_eq!(bad_request.status(), 502);
        assert_eq!(server_error.status(), 503);
    }

    #[test]
    fn model_unavailable_is_always_502() {
        let err = ProxyError::ModelUnavailable {
            status: 404,
            details: String::new(),
        };
        assert_eq!(err.status(), 502);
    }

    #[test]
    fn fallback_classification() {
        assert!(
            ProxyError::UpstreamRateLimited {
                model: "m".into(),
                retry_after: None
            }
            .allows_fallback()
        );
        assert!(ProxyError::EmptyResponse.allows_fallback());
        assert!(
            !ProxyError::Transport("timed out".into()).allows_fallback(),
            "transport errors surface without further fallback"
        );
        assert!(!ProxyError::MalformedUpstreamOutput { raw: String::new() }.allows_fallback());
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let err = ProxyError::RateLimited {
            retry_after: Duration::from_secs(12),
        };
        assert_eq!(err.status(), 429);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
    }
}
