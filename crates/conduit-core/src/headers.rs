//! Header names and helpers for the two client authentication conventions

use http::HeaderMap;
use http::header::{AUTHORIZATION, HeaderName};
use sha2::{Digest, Sha256};

/// Anthropic-style API key header
pub const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

/// Extract the key a client presented, in either dialect's convention
///
/// `x-api-key` wins over `Authorization: Bearer` when both are present.
pub fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get(X_API_KEY).and_then(|v| v.to_str().ok()) {
        let key = key.trim();
        if !key.is_empty() {
            return Some(key);
        }
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

/// Stable, non-reversible fingerprint of a presented key
///
/// Hex of the first 16 bytes of its SHA-256 digest, so raw keys never
/// end up in admission records or logs.
pub fn key_fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest[..16].iter().fold(String::with_capacity(32), |mut out, byte| {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
        out
    })
}
