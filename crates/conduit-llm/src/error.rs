use std::time::Duration;

use conduit_auth::CredentialError;
use conduit_core::{ErrorKind, HttpError};
use conduit_ratelimit::RateLimitError;
use thiserror::Error;

use crate::types::ErrorReport;

/// Backend agent failures
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent process or a session for it could not be obtained
    #[error("agent unavailable: {0}")]
    Unavailable(String),

    /// The agent produced output that could not be understood
    #[error("agent protocol error: {0}")]
    Protocol(String),

    /// The agent went silent
    #[error("agent produced no output for {}s", .0.as_secs())]
    Timeout(Duration),
}

impl HttpError for AgentError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::AgentUnavailable,
            Self::Protocol(_) => ErrorKind::AgentProtocolError,
            Self::Timeout(_) => ErrorKind::AgentTimeout,
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Unavailable(_) => "the backend agent is unavailable, try again shortly",
            Self::Protocol(_) => "the backend agent returned an unexpected response",
            Self::Timeout(_) => "the backend agent stopped responding",
        }
        .to_owned()
    }
}

/// Errors surfaced by the gateway pipeline
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Client sent a request that failed dialect validation
    #[error("invalid request: {0}")]
    MalformedRequest(String),

    /// Presented client key is missing or not accepted
    #[error("invalid or missing API key")]
    Unauthorized,

    /// Backend credential problem
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Admission denied
    #[error(transparent)]
    Admission(#[from] RateLimitError),

    /// Request ran past its deadline
    #[error("request did not complete within {}s", .0.as_secs())]
    RequestTimeout(Duration),

    /// Backend agent failure
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Failure reported inside an event stream
    #[error("{}", .0.message)]
    Stream(ErrorReport),

    /// Unexpected failure
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl HttpError for GatewayError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedRequest(_) => ErrorKind::MalformedRequest,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Credential(e) => e.kind(),
            Self::Admission(e) => e.kind(),
            Self::RequestTimeout(_) => ErrorKind::RequestTimeout,
            Self::Agent(e) => e.kind(),
            Self::Stream(report) => report.kind,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Credential(e) => e.client_message(),
            Self::Admission(e) => e.client_message(),
            Self::Agent(e) => e.client_message(),
            Self::Stream(report) => report.message.clone(),
            Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Admission(e) => e.retry_after(),
            _ => None,
        }
    }
}
