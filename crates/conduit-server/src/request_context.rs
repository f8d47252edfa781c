use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use conduit_core::{ClientIdentity, RequestContext};

/// Snapshot the request head into a [`RequestContext`] extension
///
/// Installed innermost on the model routes: by the time it runs, client
/// identification and admission have already left their extensions on the
/// request, and the snapshot carries them to the handlers.
pub async fn request_context_middleware(mut request: Request, next: Next) -> Response {
    let identity = request.extensions().get::<ClientIdentity>().cloned();
    let (head, body) = request.into_parts();

    let context = RequestContext {
        parts: head.clone(),
        client_identity: identity,
    };
    tracing::trace!(client = context.client_key(), uri = %head.uri, "request context captured");

    request = Request::from_parts(head, body);
    request.extensions_mut().insert(context);
    next.run(request).await
}
