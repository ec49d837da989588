//! Repository seams used by the reconciler

use async_trait::async_trait;
use shared::models::{AuditLogEntry, Order, OrderItem, OrderStatus, PackItem, Payment, PaymentStatus};
use thiserror::Error;

use super::correlation::CheckoutCorrelation;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt {table} row {id}: {reason}")]
    Corrupt {
        table: &'static str,
        id: String,
        reason: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Order line joined with the workflow it sells
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemLine {
    pub item: OrderItem,
    pub title: String,
    pub seller_id: String,
}

/// Pack line joined with the pack and its member workflows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackLine {
    pub item: PackItem,
    pub title: String,
    pub seller_id: String,
    pub workflow_ids: Vec<String>,
}

/// Order with everything settlement and refund need
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAggregate {
    pub order: Order,
    pub items: Vec<ItemLine>,
    pub packs: Vec<PackLine>,
}

impl OrderAggregate {
    /// Display titles of every line, in order
    pub fn titles(&self) -> Vec<&str> {
        self.items
            .iter()
            .map(|l| l.title.as_str())
            .chain(self.packs.iter().map(|l| l.title.as_str()))
            .collect()
    }
}

/// Payment with its order
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentAggregate {
    pub payment: Payment,
    pub order: OrderAggregate,
}

/// Payment row to insert; the store assigns the id
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub order_id: String,
    pub provider: String,
    pub provider_charge_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub processed_at: i64,
    pub raw_payload: serde_json::Value,
}

/// One all-or-nothing unit of work. Dropping without [`StoreTx::commit`]
/// rolls everything back.
#[async_trait]
pub trait StoreTx: Send {
    /// Load and lock an order with its items and packs
    async fn lock_order(&mut self, order_id: &str) -> Result<Option<OrderAggregate>, StoreError>;

    /// Load and lock a payment by provider charge id, with its order
    async fn lock_payment_by_charge(
        &mut self,
        provider: &str,
        charge_id: &str,
    ) -> Result<Option<PaymentAggregate>, StoreError>;

    /// `pending -> paid`; no effect on an order in any other status
    async fn mark_order_paid(
        &mut self,
        order_id: &str,
        paid_at: i64,
        provider_reference: &str,
    ) -> Result<(), StoreError>;

    async fn set_order_status(&mut self, order_id: &str, status: OrderStatus)
    -> Result<(), StoreError>;

    /// Returns `false` when a row with the same order/provider/charge exists
    async fn insert_payment_if_absent(&mut self, payment: &NewPayment) -> Result<bool, StoreError>;

    async fn update_payment_status(
        &mut self,
        payment_id: &str,
        status: PaymentStatus,
    ) -> Result<(), StoreError>;

    /// Atomic `sales_count += delta`, floored at zero
    async fn adjust_workflow_sales(&mut self, workflow_id: &str, delta: i64)
    -> Result<(), StoreError>;

    /// Atomic `sales_count += delta`, floored at zero
    async fn adjust_pack_sales(&mut self, pack_id: &str, delta: i64) -> Result<(), StoreError>;

    /// Lock a cart row until commit; `false` when the cart is gone. Sibling
    /// settlements of one cart serialize on this lock.
    async fn lock_cart(&mut self, cart_id: &str) -> Result<bool, StoreError>;

    async fn delete_cart(&mut self, cart_id: &str) -> Result<u64, StoreError>;

    async fn delete_carts_for_buyer(&mut self, buyer_id: &str) -> Result<u64, StoreError>;

    /// Pending orders that look like part of the same checkout
    async fn count_correlated_pending(
        &mut self,
        correlation: &CheckoutCorrelation,
    ) -> Result<i64, StoreError>;

    async fn append_audit(&mut self, entry: &AuditLogEntry) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ReconcileStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Non-transactional read for notification copy
    async fn buyer_display_name(&self, buyer_id: &str) -> Result<Option<String>, StoreError>;
}

/// Idempotency ledger of provider event ids
#[async_trait]
pub trait EventLedger: Send + Sync {
    async fn has_processed(&self, event_id: &str) -> Result<bool, StoreError>;

    /// Upsert; marking an already-marked event is not an error
    async fn mark_processed(
        &self,
        event_id: &str,
        event_type: &str,
        now: i64,
    ) -> Result<(), StoreError>;

    /// Delete ledger rows processed before `cutoff` (epoch millis)
    async fn purge_before(&self, cutoff: i64) -> Result<u64, StoreError>;
}
