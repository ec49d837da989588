//! Payment Model

use serde::{Deserialize, Serialize};

/// Settled payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    Refunded,
    PartialRefund,
}

impl PaymentStatus {
    /// Parse from database string value
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(Self::Succeeded),
            "refunded" => Some(Self::Refunded),
            "partial_refund" => Some(Self::PartialRefund),
            _ => None,
        }
    }

    /// Database string representation
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Refunded => "refunded",
            Self::PartialRefund => "partial_refund",
        }
    }
}

/// Payment entity
///
/// At most one row exists per `(order_id, provider, provider_charge_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    /// Provider name, e.g. `stripe`
    pub provider: String,
    pub provider_charge_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    /// Epoch millis (UTC)
    pub processed_at: i64,
    /// Raw provider object, kept for audit/debug
    pub raw_payload: serde_json::Value,
}
