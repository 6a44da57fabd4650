//! Request fingerprints for caching and coalescing.
//!
//! A fingerprint identifies a logical upstream request: the endpoint it
//! came through, the model it targets, and every semantically relevant
//! request field in a fixed order. Two logically identical requests always
//! hash identically; the model is part of the key, so identical prompts
//! against different models never share cache entries or in-flight calls.

use std::hash::{DefaultHasher, Hash, Hasher};

/// Compute a fingerprint from endpoint, model, and ordered request fields.
///
/// Uses `DefaultHasher` (SipHash) for a reasonable collision-resistance /
/// performance trade-off. The hash is deterministic within a process
/// lifetime, which is sufficient for process-local cache and in-flight
/// state. A shared backend would need a stable cross-process hash instead.
pub fn fingerprint(endpoint: &str, model: &str, fields: &[&str]) -> u64 {
    let mut hasher = DefaultHasher::new();
    endpoint.hash(&mut hasher);
    model.hash(&mut hasher);
    for field in fields {
        field.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_deterministic() {
        let a = fingerprint("gemini-audit", "gemini-2.0-flash", &["hello", "0.7"]);
        let b = fingerprint("gemini-audit", "gemini-2.0-flash", &["hello", "0.7"]);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_on_endpoint() {
        let a = fingerprint("gemini-audit", "m", &["hello"]);
        let b = fingerprint("generate-gem", "m", &["hello"]);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_differs_on_model() {
        let a = fingerprint("gemini-audit", "gemini-2.0-flash", &["hello"]);
        let b = fingerprint("gemini-audit", "gemini-1.5-flash", &["hello"]);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_differs_on_any_field() {
        let base = fingerprint("gemini-audit", "m", &["hello", "0.7", "100"]);
        assert_ne!(base, fingerprint("gemini-audit", "m", &["hallo", "0.7", "100"]));
        assert_ne!(base, fingerprint("gemini-audit", "m", &["hello", "0.8", "100"]));
        assert_ne!(base, fingerprint("gemini-audit", "m", &["hello", "0.7", "101"]));
    }

    #[test]
    fn fingerprint_field_boundaries_matter() {
        // "ab" + "c" must not collide with "a" + "bc".
        let a = fingerprint("e", "m", &["ab", "c"]);
        let b = fingerprint("e", "m", &["a", "bc"]);
        assert_ne!(a, b);
    }
}
