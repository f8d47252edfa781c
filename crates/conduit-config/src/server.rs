use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::{
    auth::ClientAuthConfig, client_identification::ClientIdentificationConfig, cors::CorsConfig,
    health::HealthConfig, rate_limit::RateLimitConfig,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_address: Option<SocketAddr>,
    /// Deadline for a single admitted request, streaming included
    #[serde(default = "default_request_timeout", deserialize_with = "crate::duration::deserialize")]
    pub request_timeout: Duration,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub cors: Option<CorsConfig>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    pub client_identification: ClientIdentificationConfig,
    #[serde(default)]
    pub auth: ClientAuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: None,
            request_timeout: default_request_timeout(),
            health: HealthConfig::default(),
            cors: None,
            rate_limit: None,
            client_identification: ClientIdentificationConfig::default(),
            auth: ClientAuthConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Address to bind when none is configured
    pub const DEFAULT_LISTEN: &'static str = "127.0.0.1:8000";
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(300)
}
