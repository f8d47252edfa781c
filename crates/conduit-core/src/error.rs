use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stable, machine-readable classification of every failure the gateway
/// can report to a client
///
/// The snake_case form is the diagnostic `code` carried by both wire
/// dialects' error envelopes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Request could not be decoded or violated dialect validation rules
    MalformedRequest,
    /// Presented client key is missing or not accepted
    Unauthorized,
    /// No backend credential is loaded
    CredentialUnavailable,
    /// Backend credential passed its expiry and could not be refreshed
    CredentialExpired,
    /// Admission denied by the rate limiter
    RateLimited,
    /// Request exceeded the gateway deadline
    RequestTimeout,
    /// Backend agent could not be reached
    AgentUnavailable,
    /// Backend agent produced output that could not be understood
    AgentProtocolError,
    /// Backend agent stopped producing output
    AgentTimeout,
    /// Anything unclassified
    #[strum(serialize = "internal_error")]
    #[serde(rename = "internal_error")]
    Internal,
}

impl ErrorKind {
    /// Diagnostic code exposed to clients
    #[must_use]
    pub fn code(self) -> &'static str {
        self.into()
    }

    /// Whether the failure originated in the backend agent
    #[must_use]
    pub const fn is_backend(self) -> bool {
        matches!(self, Self::AgentUnavailable | Self::AgentProtocolError | Self::AgentTimeout)
    }
}

/// Trait for domain errors that can be converted to HTTP responses
///
/// Implemented by each feature crate's error type. The server layer
/// renders these into the requesting dialect's envelope, keeping domain
/// errors decoupled from axum.
pub trait HttpError: std::error::Error {
    /// Stable error classification
    fn kind(&self) -> ErrorKind;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;

    /// Suggested delay before the client retries, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn codes_are_snake_case() {
        assert_eq!(ErrorKind::AgentTimeout.code(), "agent_timeout");
        assert_eq!(ErrorKind::MalformedRequest.code(), "malformed_request");
        assert_eq!(ErrorKind::Internal.code(), "internal_error");
    }

    #[test]
    fn codes_parse_back() {
        assert_eq!(ErrorKind::from_str("rate_limited").ok(), Some(ErrorKind::RateLimited));
        assert_eq!(ErrorKind::from_str("internal_error").ok(), Some(ErrorKind::Internal));
    }

    #[test]
    fn display_matches_code() {
        assert_eq!(ErrorKind::AgentProtocolError.to_string(), "agent_protocol_error");
    }

    #[test]
    fn backend_kinds() {
        assert!(ErrorKind::AgentUnavailable.is_backend());
        assert!(!ErrorKind::RateLimited.is_backend());
    }
}
