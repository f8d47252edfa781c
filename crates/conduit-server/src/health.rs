use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use conduit_llm::Gateway;
use http::StatusCode;
use serde_json::json;

/// Readiness probe
///
/// Healthy once a non-expired backend credential is held and the agent
/// probe succeeds.
pub async fn health_handler(State(gateway): State<Gateway>) -> Response {
    let readiness = gateway.readiness().await;

    if readiness.is_ready() {
        return (StatusCode::OK, Json(json!({ "status": "healthy" }))).into_response();
    }

    tracing::debug!(
        credential = readiness.credential,
        agent = readiness.agent,
        "health check failed"
    );

    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "status": "unhealthy",
            "credential": readiness.credential,
            "agent": readiness.agent,
        })),
    )
        .into_response()
}
