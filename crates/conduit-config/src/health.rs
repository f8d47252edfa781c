use serde::Deserialize;

/// `[server.health]`: the unauthenticated readiness probe
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    /// Set to `false` to leave the route unmounted
    pub enabled: bool,
    pub path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: String::from("/health"),
        }
    }
}
