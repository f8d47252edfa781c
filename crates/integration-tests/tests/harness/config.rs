//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;
use std::time::Duration;

use conduit_config::{Config, CorsConfig, RateLimitConfig, RequestRateLimit, ServerConfig};
use jiff::{SignedDuration, Timestamp};
use secrecy::SecretString;
use serde_json::json;
use tempfile::TempDir;

use super::agent::FakeAgent;

/// Token written to the credential file by default
pub const BACKEND_TOKEN: &str = "backend-oauth-token";

/// Builder for constructing test configurations
///
/// Owns the directory holding the credential file, which must outlive the
/// server it configures.
pub struct ConfigBuilder {
    config: Config,
    state_dir: TempDir,
    credential: Option<Timestamp>,
}

impl ConfigBuilder {
    /// Minimal config running `agent`, with a credential valid for an hour
    pub fn new(agent: &FakeAgent) -> Self {
        let state_dir = TempDir::new().expect("temp dir");

        let mut config = Config {
            server: ServerConfig {
                listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                request_timeout: Duration::from_secs(10),
                ..ServerConfig::default()
            },
            ..Config::default()
        };
        config.agent.command = agent.path().to_path_buf();
        config.agent.idle_timeout = Duration::from_secs(5);
        config.agent.retry_backoff = Duration::from_millis(10);
        config.credentials.path = Some(state_dir.path().join("credentials.json"));

        Self {
            config,
            state_dir,
            credential: Some(Timestamp::now() + SignedDuration::from_hours(1)),
        }
    }

    /// Start without any credential on disk
    pub fn without_credential(mut self) -> Self {
        self.credential = None;
        self
    }

    /// Set CORS configuration
    pub fn with_cors(mut self, config: CorsConfig) -> Self {
        self.config.server.cors = Some(config);
        self
    }

    /// Allow `requests` per `window` for each client
    pub fn with_per_client_limit(mut self, requests: u32, window: Duration) -> Self {
        self.config.server.rate_limit = Some(RateLimitConfig {
            global: None,
            per_client: Some(RequestRateLimit { requests, window }),
        });
        self
    }

    /// Require one of `keys` on every model request
    pub fn with_api_keys(mut self, keys: &[&str]) -> Self {
        self.config.server.auth.api_keys = keys.iter().map(|k| SecretString::from(*k)).collect();
        self
    }

    /// Per-request deadline
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.request_timeout = timeout;
        self
    }

    /// Longest agent silence before the run is abandoned
    pub fn with_agent_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.agent.idle_timeout = timeout;
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Write the credential file and return the config with its directory
    pub fn build(self) -> (Config, TempDir) {
        if let Some(expires_at) = self.credential {
            let body = json!({
                "claudeAiOauth": {
                    "accessToken": BACKEND_TOKEN,
                    "refreshToken": "backend-refresh-token",
                    "expiresAt": expires_at.as_millisecond(),
                }
            });
            let path = self.state_dir.path().join("credentials.json");
            std::fs::write(path, body.to_string()).expect("write credential file");
        }

        (self.config, self.state_dir)
    }
}
