//! Webhook entry point
//!
//! Authenticates a delivery, consults the event ledger, dispatches to the
//! reconciler and decides what the provider is told. Transport-agnostic: the
//! axum handler only adapts headers and body.

use std::sync::Arc;

use axum::http::StatusCode;
use shared::error::{AppError, ErrorCode};
use shared::webhook::WebhookAck;

use crate::reconcile::{EventKind, EventLedger, ReconcileError, Reconciler};
use crate::stripe::{self, Event, SignatureError};
use crate::util::{now_millis, now_secs};

/// Status and body returned to the provider
#[derive(Debug, Clone)]
pub struct WebhookReply {
    pub status: StatusCode,
    pub body: WebhookAck,
}

impl WebhookReply {
    fn ok(body: WebhookAck) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    fn rejected(status: StatusCode, err: &AppError) -> Self {
        Self {
            status,
            body: WebhookAck::failed(false, err),
        }
    }
}

impl From<SignatureError> for AppError {
    fn from(err: SignatureError) -> Self {
        let code = match err {
            SignatureError::Missing => ErrorCode::SignatureMissing,
            SignatureError::Malformed | SignatureError::Mismatch => ErrorCode::SignatureInvalid,
            SignatureError::Expired => ErrorCode::SignatureExpired,
        };
        AppError::with_message(code, err.to_string())
    }
}

pub struct WebhookProcessor {
    secret: String,
    tolerance_secs: i64,
    ledger: Arc<dyn EventLedger>,
    reconciler: Reconciler,
}

impl WebhookProcessor {
    pub fn new(
        secret: impl Into<String>,
        tolerance_secs: i64,
        ledger: Arc<dyn EventLedger>,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
            ledger,
            reconciler,
        }
    }

    pub async fn process(&self, payload: &[u8], signature: Option<&str>) -> WebhookReply {
        self.process_at(payload, signature, now_secs()).await
    }

    /// Same as [`process`](Self::process) with an explicit clock (unix seconds)
    pub async fn process_at(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> WebhookReply {
        // 1. Authenticate before looking at the content
        let verified = signature.ok_or(SignatureError::Missing).and_then(|header| {
            stripe::verify_webhook_signature(payload, header, &self.secret, self.tolerance_secs, now)
        });
        if let Err(e) = verified {
            tracing::warn!(error = %e, "Webhook signature verification failed");
            let err = AppError::from(e);
            return WebhookReply::rejected(err.http_status(), &err);
        }

        // 2. Envelope
        let event = match Event::decode(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(%e, "Failed to parse webhook JSON");
                let err = AppError::with_message(ErrorCode::InvalidFormat, e.to_string());
                return WebhookReply::rejected(StatusCode::BAD_REQUEST, &err);
            }
        };
        let event_id = event.id.as_str();
        let event_type = event.event_type.as_str();
        tracing::info!(event_id, event_type, "Received Stripe webhook");

        // 3. Idempotency gate
        match self.ledger.has_processed(event_id).await {
            Ok(true) => {
                tracing::info!(event_id, "Duplicate webhook event, skipping");
                return WebhookReply::ok(WebhookAck::already_processed());
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(event_id, error = %e, "Event ledger lookup failed");
                let err = AppError::new(ErrorCode::DatabaseError);
                return WebhookReply::rejected(StatusCode::INTERNAL_SERVER_ERROR, &err);
            }
        }

        // 4. Dispatch
        let Some(kind) = EventKind::from_type(event_type) else {
            tracing::debug!(event_id, event_type, "Unhandled webhook event type");
            self.mark_processed(event_id, event_type).await;
            return WebhookReply::ok(WebhookAck::received());
        };

        match self.reconciler.handle(kind, &event.data.object).await {
            Ok(reconciled) => {
                tracing::info!(
                    event_id,
                    event_type,
                    outcome = reconciled.outcome.as_str(),
                    notifications_sent = reconciled.notifications.sent(),
                    notifications_failed = reconciled.notifications.failed(),
                    "Webhook event reconciled"
                );
                self.mark_processed(event_id, event_type).await;
                WebhookReply::ok(WebhookAck::received())
            }
            Err(e) => self.failure_reply(event_id, kind, &e),
        }
    }

    /// Critical events with a transient failure ask the provider to redeliver;
    /// everything else is acknowledged with the error attached.
    fn failure_reply(&self, event_id: &str, kind: EventKind, err: &ReconcileError) -> WebhookReply {
        let app_err = AppError::from(err);
        if kind.is_critical() && err.is_retryable() {
            tracing::error!(
                event_id,
                event_type = kind.as_str(),
                error = %err,
                "Critical webhook event failed, requesting redelivery"
            );
            return WebhookReply::rejected(StatusCode::INTERNAL_SERVER_ERROR, &app_err);
        }

        tracing::warn!(
            event_id,
            event_type = kind.as_str(),
            category = app_err.code.category().name(),
            error = %err,
            "Webhook event failed, acknowledged without processing"
        );
        WebhookReply::ok(WebhookAck::failed(true, &app_err))
    }

    async fn mark_processed(&self, event_id: &str, event_type: &str) {
        if let Err(e) = self
            .ledger
            .mark_processed(event_id, event_type, now_millis())
            .await
        {
            tracing::error!(event_id, error = %e, "Failed to record processed webhook event");
        }
    }
}
