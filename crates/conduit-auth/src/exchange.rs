use std::time::Duration;

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use crate::{Credential, CredentialError};

/// Trades refresh material for a new credential
#[async_trait]
pub trait RefreshExchange: Send + Sync {
    /// Perform one refresh exchange
    async fn refresh(&self, refresh_token: &SecretString) -> Result<Credential, CredentialError>;
}

/// OAuth `refresh_token` grant against a token endpoint
pub struct OAuthExchange {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: u64,
}

impl OAuthExchange {
    /// Create an exchange client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(token_url: Url, client_id: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            token_url,
            client_id,
        })
    }
}

#[async_trait]
impl RefreshExchange for OAuthExchange {
    async fn refresh(&self, refresh_token: &SecretString) -> Result<Credential, CredentialError> {
        let response = self
            .http
            .post(self.token_url.clone())
            .json(&serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token.expose_secret(),
                "client_id": self.client_id,
            }))
            .send()
            .await
            .map_err(|e| CredentialError::RefreshFailed(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(%status, body = %body.chars().take(256).collect::<String>(), "token endpoint rejected refresh");
            return Err(CredentialError::RefreshFailed(format!("token endpoint returned {status}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::RefreshFailed(format!("invalid token response: {e}")))?;

        let lifetime = i64::try_from(token.expires_in).unwrap_or(i64::MAX);
        let expires_at = Timestamp::now()
            .checked_add(SignedDuration::from_secs(lifetime))
            .map_err(|e| CredentialError::RefreshFailed(format!("invalid token lifetime: {e}")))?;

        // Endpoints that do not rotate refresh tokens omit the field
        let refresh = token
            .refresh_token
            .unwrap_or_else(|| refresh_token.expose_secret().to_owned());

        Ok(Credential::new(token.access_token, refresh, expires_at))
    }
}
