/// Runtime context for one proxied request
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP request parts (method, URI, headers, extensions)
    pub parts: http::request::Parts,
    /// Client identity used as the admission key
    pub client_identity: Option<ClientIdentity>,
}

impl RequestContext {
    /// Create a minimal context for non-HTTP use (tests, probes)
    pub fn empty() -> Self {
        let (parts, ()) = http::Request::new(()).into_parts();

        Self {
            parts,
            client_identity: None,
        }
    }

    /// Access request headers
    pub fn headers(&self) -> &http::HeaderMap {
        &self.parts.headers
    }

    /// Admission key for this request
    pub fn client_key(&self) -> &str {
        self.client_identity
            .as_ref()
            .map_or(ClientIdentity::ANONYMOUS, |identity| identity.client_id.as_str())
    }
}

/// Identified client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Client identifier used to key admission records
    pub client_id: String,
    /// Where the identifier came from
    pub source: IdentitySource,
}

impl ClientIdentity {
    /// Key shared by every client that could not be identified
    pub const ANONYMOUS: &'static str = "anonymous";

    /// Identity for a client without any identifying material
    pub fn anonymous() -> Self {
        Self {
            client_id: Self::ANONYMOUS.to_owned(),
            source: IdentitySource::Anonymous,
        }
    }
}

/// Origin of a client identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// Configured identification header
    Header,
    /// Fingerprint of the presented API key
    PresentedKey,
    /// Peer socket address
    PeerAddress,
    /// Nothing identifying was available
    Anonymous,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_is_anonymous() {
        let ctx = RequestContext::empty();
        assert!(ctx.client_identity.is_none());
        assert!(ctx.headers().is_empty());
        assert_eq!(ctx.client_key(), "anonymous");
    }

    #[test]
    fn identified_context_uses_client_id() {
        let mut ctx = RequestContext::empty();
        ctx.client_identity = Some(ClientIdentity {
            client_id: "team-a".to_owned(),
            source: IdentitySource::Header,
        });
        assert_eq!(ctx.client_key(), "team-a");
    }
}
