//! Audit Log Model

use serde::{Deserialize, Serialize};

/// Financial state transitions that are recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "order.completed")]
    OrderCompleted,
    #[serde(rename = "pack.purchased")]
    PackPurchased,
    #[serde(rename = "order.refunded")]
    OrderRefunded,
    #[serde(rename = "order.partial_refund")]
    OrderPartialRefund,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCompleted => "order.completed",
            Self::PackPurchased => "pack.purchased",
            Self::OrderRefunded => "order.refunded",
            Self::OrderPartialRefund => "order.partial_refund",
        }
    }
}

/// Immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLogEntry {
    pub actor: String,
    pub action: AuditAction,
    /// `order` or `pack`
    pub entity_type: String,
    pub entity_id: String,
    pub metadata: serde_json::Value,
    pub created_at: i64,
}
