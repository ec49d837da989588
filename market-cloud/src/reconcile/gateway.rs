//! Payment provider lookups

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// The charge that settled a payment intent
#[derive(Debug, Clone, PartialEq)]
pub struct SettledCharge {
    pub payment_intent_id: String,
    /// Empty when the intent has not produced a charge yet
    pub charge_id: String,
    /// Provider object as returned, stored with the payment
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Resolve the settled charge of a payment intent
    async fn settled_charge(&self, payment_intent_id: &str) -> Result<SettledCharge, GatewayError>;
}
