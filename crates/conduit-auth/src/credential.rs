use std::fmt;
use std::time::Duration;

use jiff::Timestamp;
use secrecy::{ExposeSecret, SecretString};

/// One refreshable OAuth credential
///
/// Immutable once built; the store swaps whole values on refresh.
#[derive(Clone)]
pub struct Credential {
    access_token: SecretString,
    refresh_token: SecretString,
    expires_at: Timestamp,
}

impl Credential {
    /// Build a credential from its parts
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>, expires_at: Timestamp) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: SecretString::from(refresh_token.into()),
            expires_at,
        }
    }

    /// Instant after which the access token is rejected
    pub const fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    /// Refresh material for the next exchange
    pub const fn refresh_token(&self) -> &SecretString {
        &self.refresh_token
    }

    /// Access token for a single request
    pub fn access_token(&self) -> AccessToken {
        AccessToken(self.access_token.clone())
    }

    /// Time left before expiry, zero once expired
    pub fn remaining(&self, now: Timestamp) -> Duration {
        Duration::try_from(self.expires_at.duration_since(now)).unwrap_or(Duration::ZERO)
    }

    /// Whether expiry falls within `margin` of `now`
    pub fn expires_within(&self, margin: Duration, now: Timestamp) -> bool {
        self.remaining(now) <= margin
    }

    /// Whether the access token has passed its true expiry
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Access token handed to a single dispatch
#[derive(Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    /// Raw token value, for attaching to the agent invocation only
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

impl From<&str> for AccessToken {
    fn from(value: &str) -> Self {
        Self(SecretString::from(value.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;

    use super::*;

    fn credential_expiring_in(secs: i64, now: Timestamp) -> Credential {
        Credential::new("access", "refresh", now + SignedDuration::from_secs(secs))
    }

    #[test]
    fn margin_checks() {
        let now = Timestamp::now();
        let margin = Duration::from_secs(60);

        assert!(!credential_expiring_in(3600, now).expires_within(margin, now));
        assert!(credential_expiring_in(30, now).expires_within(margin, now));
        assert!(!credential_expiring_in(30, now).is_expired(now));
        assert!(credential_expiring_in(-1, now).is_expired(now));
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let now = Timestamp::now();
        assert_eq!(credential_expiring_in(-120, now).remaining(now), Duration::ZERO);
        assert_eq!(credential_expiring_in(90, now).remaining(now), Duration::from_secs(90));
    }

    #[test]
    fn debug_redacts_secrets() {
        let credential = credential_expiring_in(60, Timestamp::now());
        let rendered = format!("{credential:?} {:?}", credential.access_token());
        assert!(!rendered.contains("access\""));
        assert!(rendered.contains("[REDACTED]"));
    }
}
