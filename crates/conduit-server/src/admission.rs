use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use conduit_core::ClientIdentity;
use conduit_llm::{Dialect, error_response};
use conduit_ratelimit::AdmissionGate;

/// Admit or reject the request, then stamp its deadline into extensions
///
/// Rejections render a 429 envelope in the route's dialect with a
/// `retry-after` header.
pub async fn admission_middleware(gate: Arc<AdmissionGate>, mut request: Request, next: Next) -> Response {
    let client_key = request
        .extensions()
        .get::<ClientIdentity>()
        .map_or(ClientIdentity::ANONYMOUS, |identity| identity.client_id.as_str());

    match gate.admit(client_key).into_result() {
        Ok(deadline) => {
            request.extensions_mut().insert(deadline);
            next.run(request).await
        }
        Err(e) => error_response(Dialect::for_path(request.uri().path()), &e),
    }
}
