use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use conduit_core::headers::presented_key;
use conduit_llm::{Dialect, GatewayError, error_response};
use secrecy::{ExposeSecret, SecretString};

/// Reject requests whose presented key is missing or not on the allow-list
///
/// Accepts both `x-api-key` and `Authorization: Bearer`. The key only gates
/// the client; it is never forwarded to the backend.
pub async fn auth_middleware(api_keys: Arc<[SecretString]>, request: Request, next: Next) -> Response {
    let accepted = presented_key(request.headers())
        .is_some_and(|key| api_keys.iter().any(|allowed| allowed.expose_secret() == key));

    if accepted {
        return next.run(request).await;
    }

    let dialect = Dialect::for_path(request.uri().path());
    tracing::debug!(path = %request.uri().path(), "rejected request with missing or unknown key");

    error_response(dialect, &GatewayError::Unauthorized)
}
