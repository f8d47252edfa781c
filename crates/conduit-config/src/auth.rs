use secrecy::SecretString;
use serde::Deserialize;

/// Client key allow-list
///
/// Keys identify and gate clients only. They are never forwarded to the
/// backend agent, which authenticates with the held credential.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientAuthConfig {
    /// Accepted keys; an empty list disables the check
    #[serde(default)]
    pub api_keys: Vec<SecretString>,
}

impl ClientAuthConfig {
    /// Whether presented keys are checked at all
    pub fn enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }
}
