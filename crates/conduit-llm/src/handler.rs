//! Axum route handlers for the Anthropic and `OpenAI` endpoints

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json, Router, routing};
use conduit_core::{ErrorKind, HttpError, RequestContext};
use futures_util::StreamExt;
use http::{HeaderValue, header};

use crate::adapter::Dialect;
use crate::state::{FrameStream, Gateway, GatewayResponse};

/// Router serving `/v1/messages`, `/v1/chat/completions` and `/v1/models`
pub fn model_router(gateway: Gateway) -> Router {
    Router::new()
        .route("/v1/messages", routing::post(anthropic_messages))
        .route("/v1/chat/completions", routing::post(openai_chat_completions))
        .route("/v1/models", routing::get(list_models))
        .with_state(gateway)
}

/// Handle `POST /v1/messages`
async fn anthropic_messages(
    State(gateway): State<Gateway>,
    Extension(context): Extension<RequestContext>,
    body: Bytes,
) -> Response {
    respond(&gateway, Dialect::Anthropic, &body, &context).await
}

/// Handle `POST /v1/chat/completions`
async fn openai_chat_completions(
    State(gateway): State<Gateway>,
    Extension(context): Extension<RequestContext>,
    body: Bytes,
) -> Response {
    respond(&gateway, Dialect::OpenAi, &body, &context).await
}

/// Handle `GET /v1/models`
async fn list_models(State(gateway): State<Gateway>) -> Response {
    Json(gateway.list_models()).into_response()
}

async fn respond(gateway: &Gateway, dialect: Dialect, body: &[u8], context: &RequestContext) -> Response {
    match gateway.handle(dialect, body, context).await {
        Ok(GatewayResponse::Complete(body)) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Ok(GatewayResponse::Stream(frames)) => sse_response(frames),
        Err(e) => {
            let kind = e.kind();
            if kind == ErrorKind::Internal {
                tracing::error!(error = %e, %dialect, "request failed");
            } else if kind.is_backend() {
                tracing::warn!(error = %e, %dialect, "backend agent failed");
            } else {
                tracing::debug!(error = %e, %dialect, "request rejected");
            }
            error_response(dialect, &e)
        }
    }
}

fn sse_response(frames: FrameStream) -> Response {
    let events = frames.map(|frame| {
        let event = Event::default().data(frame.data);
        Ok::<_, Infallible>(match frame.event {
            Some(name) => event.event(name),
            None => event,
        })
    });

    (
        [(header::CACHE_CONTROL, "no-cache")],
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
        .into_response()
}

/// Error envelope in `dialect`'s shape, with `retry-after` when known
pub fn error_response(dialect: Dialect, error: &dyn HttpError) -> Response {
    let kind = error.kind();
    let mut response = (
        dialect.error_status(kind),
        Json(dialect.error_body(kind, &error.client_message())),
    )
        .into_response();

    if let Some(retry_after) = error.retry_after() {
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
    }

    response
}
