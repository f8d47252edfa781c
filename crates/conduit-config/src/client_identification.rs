use serde::Deserialize;

/// How clients are told apart for admission
///
/// Sources are tried in order: the configured header, a fingerprint of the
/// presented API key, then the peer address. Requests matching none share
/// the anonymous bucket.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientIdentificationConfig {
    /// Header carrying an explicit client id (e.g. `x-client-id`)
    #[serde(default)]
    pub header: Option<String>,
    /// Fall back to a fingerprint of the presented API key
    #[serde(default = "default_true")]
    pub presented_key: bool,
    /// Fall back to the peer IP address
    #[serde(default = "default_true")]
    pub peer_address: bool,
}

impl Default for ClientIdentificationConfig {
    fn default() -> Self {
        Self {
            header: None,
            presented_key: true,
            peer_address: true,
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}
