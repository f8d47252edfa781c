use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Backend credential storage and refresh exchange
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    /// Credential file; defaults to `$HOME/.claude/.credentials.json`
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// OAuth token endpoint used for refresh
    #[serde(default = "default_token_url")]
    pub token_url: Url,
    /// OAuth client id sent with refresh requests
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Refresh once expiry is this close
    #[serde(default = "default_refresh_margin", deserialize_with = "crate::duration::deserialize")]
    pub refresh_margin: Duration,
    /// Wait before retrying a failed background refresh
    #[serde(default = "default_retry_interval", deserialize_with = "crate::duration::deserialize")]
    pub retry_interval: Duration,
    /// Timeout for a single refresh exchange
    #[serde(default = "default_exchange_timeout", deserialize_with = "crate::duration::deserialize")]
    pub exchange_timeout: Duration,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: None,
            token_url: default_token_url(),
            client_id: default_client_id(),
            refresh_margin: default_refresh_margin(),
            retry_interval: default_retry_interval(),
            exchange_timeout: default_exchange_timeout(),
        }
    }
}

impl CredentialsConfig {
    /// Credential file location after applying the home-directory default
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".claude").join(".credentials.json"))
        })
    }
}

fn default_token_url() -> Url {
    Url::parse("https://console.anthropic.com/v1/oauth/token").expect("must be a valid url")
}

fn default_client_id() -> String {
    "9d1c250a-e61b-44d9-88ed-5944d1962f5e".to_owned()
}

const fn default_refresh_margin() -> Duration {
    Duration::from_secs(60)
}

const fn default_retry_interval() -> Duration {
    Duration::from_secs(30)
}

const fn default_exchange_timeout() -> Duration {
    Duration::from_secs(30)
}
