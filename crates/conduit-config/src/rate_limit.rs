use std::time::Duration;

use serde::Deserialize;

/// Admission configuration
///
/// Both scopes are optional. When both are set a request must pass the
/// global bucket and its own client bucket.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Single bucket shared by every request
    #[serde(default)]
    pub global: Option<RequestRateLimit>,
    /// One bucket per identified client
    #[serde(default)]
    pub per_client: Option<RequestRateLimit>,
}

/// Fixed-window request limit
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestRateLimit {
    /// Maximum admissions per window
    pub requests: u32,
    /// Window length (e.g. "60s", "1h")
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub window: Duration,
}
