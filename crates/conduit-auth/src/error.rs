use conduit_core::{ErrorKind, HttpError};

/// Credential store errors
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// No credential has been loaded
    #[error("no backend credential is loaded")]
    Unavailable,

    /// The held credential passed its expiry and could not be refreshed
    #[error("backend credential expired at {expired_at}")]
    Expired {
        /// Instant the credential stopped being valid
        expired_at: jiff::Timestamp,
    },

    /// The refresh exchange failed
    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),

    /// The credential file could not be read or written
    #[error("credential storage error: {0}")]
    Storage(String),

    /// Unexpected failure
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HttpError for CredentialError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Expired { .. } => ErrorKind::CredentialExpired,
            Self::Unavailable | Self::RefreshFailed(_) | Self::Storage(_) => ErrorKind::CredentialUnavailable,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    fn client_message(&self) -> String {
        match self.kind() {
            ErrorKind::CredentialExpired => "the gateway's backend credential has expired".to_owned(),
            ErrorKind::CredentialUnavailable => "the gateway has no usable backend credential".to_owned(),
            _ => "an internal error occurred".to_owned(),
        }
    }
}
