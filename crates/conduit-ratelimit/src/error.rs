use std::time::Duration;

use conduit_core::{ErrorKind, HttpError};
use thiserror::Error;

/// Admission errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Configuration error
    #[error("rate limit configuration error: {0}")]
    Config(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded, retry in {}s", retry_after_secs(*.retry_after))]
    Exceeded {
        /// Time until the key's window ends
        retry_after: Duration,
    },
}

impl RateLimitError {
    /// Whole seconds for a `retry-after` header, rounded up and at least 1
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Exceeded { retry_after } => Some(retry_after_secs(*retry_after)),
            Self::Config(_) => None,
        }
    }
}

fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl HttpError for RateLimitError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Exceeded { .. } => ErrorKind::RateLimited,
            Self::Config(_) => ErrorKind::Internal,
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Exceeded { .. } => self.to_string(),
            Self::Config(_) => "an internal error occurred".to_owned(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Exceeded { retry_after } => Some(*retry_after),
            Self::Config(_) => None,
        }
    }
}
