//! Environment configuration for heimdalld.
//!
//! The deployment model is environment-variable driven: one upstream API
//! key, an optional primary-model override shared by every endpoint, a
//! comma-separated list of extra fallback models, and a comma-separated
//! allowed-origin list. A missing API key fails fast with a configuration
//! error before any upstream interaction.

use crate::{ProxyError, Result};

/// Environment variable holding the upstream API key. Required.
pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
/// Environment variable overriding every endpoint's primary model.
pub const ENV_MODEL: &str = "GEMINI_MODEL";
/// Environment variable with extra fallback models, comma-separated.
pub const ENV_FALLBACK_MODELS: &str = "GEMINI_FALLBACK_MODELS";
/// Environment variable with allowed origins, comma-separated.
pub const ENV_ALLOWED_ORIGINS: &str = "ALLOWED_ORIGINS";
/// Environment variable with the bind address.
pub const ENV_ADDR: &str = "HEIMDALL_ADDR";

const DEFAULT_ADDR: &str = "127.0.0.1:8787";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream API key, passed to the generative-language API as a query
    /// parameter. Never logged or echoed in responses.
    pub api_key: String,
    /// Primary model override. When set, replaces each endpoint's default
    /// primary model; per-request overrides still take precedence.
    pub primary_model: Option<String>,
    /// Extra fallback models appended after the hardcoded fallbacks.
    pub extra_fallback_models: Vec<String>,
    /// Exact origins admitted by the request gate. Empty means same-origin.
    pub allowed_origins: Vec<String>,
    /// Address to bind to (default: 127.0.0.1:8787).
    pub address: String,
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an injected variable lookup.
    ///
    /// Tests use this to avoid mutating process-wide environment state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup(ENV_API_KEY)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ProxyError::Configuration(format!("{ENV_API_KEY} is not configured"))
            })?;

        Ok(Self {
            api_key,
            primary_model: lookup(ENV_MODEL)
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            extra_fallback_models: lookup(ENV_FALLBACK_MODELS)
                .map(|v| split_csv(&v))
                .unwrap_or_default(),
            allowed_origins: lookup(ENV_ALLOWED_ORIGINS)
                .map(|v| split_csv(&v))
                .unwrap_or_default(),
            address: lookup(ENV_ADDR).unwrap_or_else(|| DEFAULT_ADDR.to_string()),
        })
    }
}

/// Split a comma-separated value, trimming entries and dropping empties.
fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let result = Config::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(ProxyError::Configuration(_))));
    }

    #[test]
    fn blank_api_key_is_a_configuration_error() {
        let result = Config::from_lookup(lookup_from(&[(ENV_API_KEY, "  ")]));
        assert!(matches!(result, Err(ProxyError::Configuration(_))));
    }

    #[test]
    fn minimal_config_has_defaults() {
        let config = Config::from_lookup(lookup_from(&[(ENV_API_KEY, "test-key")])).unwrap();
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.primary_model, None);
        assert!(config.extra_fallback_models.is_empty());
        assert!(config.allowed_origins.is_empty());
        assert_eq!(config.address, "127.0.0.1:8787");
    }

    #[test]
    fn comma_lists_are_trimmed_and_filtered() {
        let config = Config::from_lookup(lookup_from(&[
            (ENV_API_KEY, "k"),
            (ENV_FALLBACK_MODELS, "gemini-a, gemini-b ,,"),
            (ENV_ALLOWED_ORIGINS, "https://a.test, https://b.test"),
        ]))
        .unwrap();
        assert_eq!(config.extra_fallback_models, vec!["gemini-a", "gemini-b"]);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.test", "https://b.test"]
        );
    }

    #[test]
    fn primary_model_is_trimmed() {
        let config = Config::from_lookup(lookup_from(&[
            (ENV_API_KEY, "k"),
            (ENV_MODEL, " gemini-2.5-pro "),
        ]))
        .unwrap();
        assert_eq!(config.primary_model.as_deref(), Some("gemini-2.5-pro"));
    }
}
