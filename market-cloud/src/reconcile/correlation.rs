//! Multi-seller checkout correlation
//!
//! Orders carry no checkout-session key, so sibling orders of one
//! multi-seller checkout are recognised heuristically: same buyer, created
//! within [`CORRELATION_WINDOW_MS`] of the settling order, still pending.
//! Unrelated purchases by the same buyer inside the window are counted too.

use shared::models::Order;

/// Half-width of the correlation window (5 minutes)
pub const CORRELATION_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Query describing the sibling orders of one checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCorrelation {
    pub buyer_id: String,
    /// Inclusive bounds, epoch millis
    pub created_from: i64,
    pub created_to: i64,
    /// The order being settled
    pub exclude_order_id: String,
}

impl CheckoutCorrelation {
    pub fn for_order(order: &Order) -> Self {
        Self {
            buyer_id: order.buyer_id.clone(),
            created_from: order.created_at.saturating_sub(CORRELATION_WINDOW_MS),
            created_to: order.created_at.saturating_add(CORRELATION_WINDOW_MS),
            exclude_order_id: order.id.clone(),
        }
    }

    /// Whether `other` counts as a pending sibling
    pub fn matches(&self, other: &Order) -> bool {
        other.id != self.exclude_order_id
            && other.buyer_id == self.buyer_id
            && other.status == shared::models::OrderStatus::Pending
            && (self.created_from..=self.created_to).contains(&other.created_at)
    }
}
