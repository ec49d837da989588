//! Stripe webhook handler
//!
//! POST /stripe/webhook: raw body is required for signature verification

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use shared::webhook::WebhookAck;

use crate::state::AppState;
use crate::stripe::SIGNATURE_HEADER;

/// Handle incoming Stripe webhook events
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookAck>) {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let reply = state.processor.process(&body, signature).await;
    (reply.status, Json(reply.body))
}
