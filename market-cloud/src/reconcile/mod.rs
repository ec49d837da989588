//! Payment-event reconciliation
//!
//! Settles and refunds marketplace orders from provider events:
//!
//! - [`machine`] decides what an event means for an order (no I/O)
//! - [`engine::Reconciler`] runs the resulting commands inside one store
//!   transaction, then dispatches notifications best-effort
//! - [`store`], [`gateway`] and [`notify`] are the injected collaborators

pub mod correlation;
pub mod engine;
pub mod event;
pub mod gateway;
pub mod machine;
pub mod memory;
pub mod notify;
pub mod store;

use shared::error::{AppError, ErrorCode};
use thiserror::Error;

pub use correlation::CheckoutCorrelation;
pub use engine::{Reconciled, Reconciler, TestOrderPolicy};
pub use event::EventKind;
pub use gateway::{GatewayError, PaymentGateway, SettledCharge};
pub use machine::{Command, Outcome, Transition};
pub use memory::MemoryStore;
pub use notify::{Delivery, NotificationReport, Notifier, NotifyError};
pub use store::{EventLedger, ReconcileStore, StoreError, StoreTx};

/// Reconciliation failure
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("missing metadata field `{0}`")]
    MissingMetadata(&'static str),

    #[error("checkout session {0} has no payment intent")]
    NoPaymentIntent(String),

    #[error("payment provider lookup failed: {0}")]
    Upstream(#[from] GatewayError),

    #[error("invalid settlement: {0}")]
    InvalidSettlement(&'static str),

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("no payment recorded for charge {0}")]
    PaymentNotFound(String),

    #[error("undecodable {kind} object: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// Whether a later redelivery of the same event can succeed
    ///
    /// `Decode` is permanent even on `checkout.session.completed`: the
    /// provider redelivers the same bytes, so a payload that fails to decode
    /// once fails every time and is acknowledged instead of retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::OrderNotFound(_) | Self::PaymentNotFound(_) | Self::Decode { .. }
        )
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingMetadata(_) => ErrorCode::OrderMetadataMissing,
            Self::NoPaymentIntent(_) | Self::Upstream(_) => ErrorCode::PaymentProviderError,
            Self::InvalidSettlement(_) => ErrorCode::PaymentInvalidSettlement,
            Self::OrderNotFound(_) => ErrorCode::OrderNotFound,
            Self::PaymentNotFound(_) => ErrorCode::PaymentNotFound,
            Self::Decode { .. } => ErrorCode::InvalidFormat,
            Self::Store(_) => ErrorCode::DatabaseError,
        }
    }
}

impl From<&ReconcileError> for AppError {
    fn from(err: &ReconcileError) -> Self {
        match err {
            // Infrastructure details stay in the logs
            ReconcileError::Store(_) => AppError::new(err.code()),
            ReconcileError::MissingMetadata(field) => {
                AppError::with_message(err.code(), err.to_string()).with_detail("field", *field)
            }
            ReconcileError::OrderNotFound(order_id) => {
                AppError::with_message(err.code(), err.to_string())
                    .with_detail("order_id", order_id.as_str())
            }
            ReconcileError::PaymentNotFound(charge_id) => {
                AppError::with_message(err.code(), err.to_string())
                    .with_detail("charge_id", charge_id.as_str())
            }
            _ => AppError::with_message(err.code(), err.to_string()),
        }
    }
}
