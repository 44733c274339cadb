use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;

use zapwoot_bridge::WebhookOutcome;
use zapwoot_core::domain::session::SessionId;
use zapwoot_core::domain::webhook::WebhookEvent;

use super::{ApiError, ApiState};

pub const WEBHOOK_SECRET_HEADER: &str = "x-zapwoot-webhook-secret";

pub fn routes() -> Router<ApiState> {
    Router::new().route("/api/v1/webhooks/chatwoot/{session_id}", post(chatwoot_webhook))
}

async fn chatwoot_webhook(
    Path(session_id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(event): Json<WebhookEvent>,
) -> Result<Json<WebhookOutcome>, ApiError> {
    verify_secret(&headers, &state)?;

    let session_id = SessionId(session_id);
    state.sessions.get(&session_id).await?;

    let outcome = state.bridge.process_webhook(&session_id, event).await?;
    Ok(Json(outcome))
}

fn verify_secret(headers: &HeaderMap, state: &ApiState) -> Result<(), ApiError> {
    let Some(secret) = &state.webhook_secret else {
        return Ok(());
    };

    match headers.get(WEBHOOK_SECRET_HEADER).and_then(|value| value.to_str().ok()) {
        Some(provided) if secret_matches(provided, secret.expose_secret()) => Ok(()),
        Some(_) => Err(ApiError::Unauthorized("invalid webhook secret")),
        None => Err(ApiError::Unauthorized("missing webhook secret")),
    }
}

/// Compares in constant time for equal lengths.
fn secret_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}
