//! Order Model

use serde::{Deserialize, Serialize};

/// Order lifecycle status
///
/// Orders are created `pending` by checkout and only ever move forward:
///
/// ```text
/// pending ─┬─> paid ─┬─> refunded
///          │         └─> partial_refund ─┬─> partial_refund
///          ├─> cancelled                 └─> refunded
///          └─> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Refunded,
    PartialRefund,
    Cancelled,
    Failed,
}

impl OrderStatus {
    /// Parse from database string value
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "refunded" => Some(Self::Refunded),
            "partial_refund" => Some(Self::PartialRefund),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Database string representation
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
            Self::PartialRefund => "partial_refund",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Whether `next` is a legal forward move from this status
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid | Cancelled | Failed)
                | (Paid, Refunded | PartialRefund)
                | (PartialRefund, PartialRefund | Refunded)
        )
    }

    /// Funds were captured for this order at some point
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Paid | Self::PartialRefund | Self::Refunded)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db())
    }
}

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Order {
    pub id: String,
    pub buyer_id: String,
    pub status: OrderStatus,
    /// Total in minor currency units
    pub total_cents: i64,
    /// ISO currency code
    pub currency: String,
    /// Provider session / intent reference recorded at settlement
    pub provider_reference: Option<String>,
    /// Epoch millis (UTC)
    pub paid_at: Option<i64>,
    /// Epoch millis (UTC)
    pub created_at: i64,
}

/// Workflow line of an order, unit price frozen at purchase time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub workflow_id: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

/// Pack line of an order, unit price frozen at purchase time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackItem {
    pub id: String,
    pub order_id: String,
    pub pack_id: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Refunded,
            OrderStatus::PartialRefund,
            OrderStatus::Cancelled,
            OrderStatus::Failed,
        ] {
            assert_eq!(OrderStatus::from_db(status.as_db()), Some(status));
        }
        assert_eq!(OrderStatus::from_db("PAID"), None);
    }

    #[test]
    fn test_forward_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Refunded));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::PartialRefund));
        assert!(OrderStatus::PartialRefund.can_transition_to(OrderStatus::Refunded));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Refunded.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Refunded));
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&OrderStatus::PartialRefund).unwrap();
        assert_eq!(json, "\"partial_refund\"");
    }
}
