use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::Response;
use conduit_config::ClientIdentificationConfig;
use conduit_core::headers::{key_fingerprint, presented_key};
use conduit_core::{ClientIdentity, IdentitySource};

/// Middleware that stores the caller's `ClientIdentity` in request extensions
///
/// Every request gets an identity; callers with nothing identifying share
/// the anonymous admission bucket.
pub async fn client_id_middleware(config: ClientIdentificationConfig, mut request: Request, next: Next) -> Response {
    let identity = identify(&config, &request);
    request.extensions_mut().insert(identity);

    next.run(request).await
}

fn identify(config: &ClientIdentificationConfig, request: &Request) -> ClientIdentity {
    let from_header = config.header.as_deref().and_then(|name| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| (v.to_owned(), IdentitySource::Header))
    });

    let from_key = || {
        config
            .presented_key
            .then(|| presented_key(request.headers()))
            .flatten()
            .map(|key| (format!("key:{}", key_fingerprint(key)), IdentitySource::PresentedKey))
    };

    let from_peer = || {
        config
            .peer_address
            .then(|| request.extensions().get::<ConnectInfo<SocketAddr>>())
            .flatten()
            .map(|ConnectInfo(addr)| (format!("ip:{}", addr.ip()), IdentitySource::PeerAddress))
    };

    from_header
        .or_else(from_key)
        .or_else(from_peer)
        .map_or_else(ClientIdentity::anonymous, |(client_id, source)| ClientIdentity {
            client_id,
            source,
        })
}
