#![allow(clippy::must_use_candidate)]

pub mod agent;
pub mod auth;
pub mod client_identification;
pub mod cors;
pub mod credentials;
mod duration;
mod env;
pub mod health;
pub mod llm;
mod loader;
pub mod rate_limit;
pub mod server;
pub mod telemetry;

use serde::Deserialize;

pub use agent::*;
pub use auth::*;
pub use client_identification::*;
pub use cors::*;
pub use credentials::*;
pub use health::*;
pub use llm::*;
pub use rate_limit::*;
pub use server::*;
pub use telemetry::*;

/// Top-level conduit configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Backend agent process configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// Backend credential storage and refresh
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Protocol translation defaults
    #[serde(default)]
    pub llm: LlmConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
