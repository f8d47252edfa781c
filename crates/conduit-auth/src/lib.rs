//! Backend credential store
//!
//! Holds the single OAuth credential the backend agent runs under, refreshes
//! it before expiry with at most one exchange in flight, and persists every
//! refreshed credential to disk.

mod credential;
mod error;
mod exchange;
mod storage;
mod store;

pub use credential::{AccessToken, Credential};
pub use error::CredentialError;
pub use exchange::{OAuthExchange, RefreshExchange};
pub use storage::CredentialFile;
pub use store::CredentialStore;
