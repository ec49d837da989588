//! PostgreSQL implementation of the reconciliation store and event ledger

use async_trait::async_trait;
use shared::models::{
    AuditLogEntry, Order, OrderItem, OrderStatus, PackItem, Payment, PaymentStatus,
};
use sqlx::{PgPool, Postgres, Transaction};

use super::orders::{ItemRow, OrderRow, PackItemRow};
use super::payments::PaymentRow;
use super::{audit, carts, catalog, orders, payments, processed_events, users};
use crate::reconcile::store::{
    ItemLine, NewPayment, OrderAggregate, PackLine, PaymentAggregate,
};
use crate::reconcile::{CheckoutCorrelation, EventLedger, ReconcileStore, StoreError, StoreTx};
use crate::util::new_id;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::from_db(&row.status).ok_or_else(|| StoreError::Corrupt {
            table: "orders",
            id: row.id.clone(),
            reason: format!("unknown status {:?}", row.status),
        })?;
        Ok(Order {
            id: row.id,
            buyer_id: row.buyer_id,
            status,
            total_cents: row.total_cents,
            currency: row.currency,
            provider_reference: row.provider_reference,
            paid_at: row.paid_at,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status = PaymentStatus::from_db(&row.status).ok_or_else(|| StoreError::Corrupt {
            table: "payments",
            id: row.id.clone(),
            reason: format!("unknown status {:?}", row.status),
        })?;
        Ok(Payment {
            id: row.id,
            order_id: row.order_id,
            provider: row.provider,
            provider_charge_id: row.provider_charge_id,
            amount_cents: row.amount_cents,
            currency: row.currency,
            status,
            processed_at: row.processed_at,
            raw_payload: row.raw_payload,
        })
    }
}

impl From<ItemRow> for ItemLine {
    fn from(row: ItemRow) -> Self {
        ItemLine {
            item: OrderItem {
                id: row.id,
                order_id: row.order_id,
                workflow_id: row.workflow_id,
                quantity: row.quantity,
                unit_price_cents: row.unit_price_cents,
            },
            title: row.title,
            seller_id: row.seller_id,
        }
    }
}

impl From<PackItemRow> for PackLine {
    fn from(row: PackItemRow) -> Self {
        PackLine {
            item: PackItem {
                id: row.id,
                order_id: row.order_id,
                pack_id: row.pack_id,
                quantity: row.quantity,
                unit_price_cents: row.unit_price_cents,
            },
            title: row.title,
            seller_id: row.seller_id,
            workflow_ids: row.workflow_ids,
        }
    }
}

impl PgTx {
    async fn load_aggregate(&mut self, order_id: &str) -> Result<Option<OrderAggregate>, StoreError> {
        let Some(row) = orders::lock(&mut self.tx, order_id).await? else {
            return Ok(None);
        };
        let order = Order::try_from(row)?;
        let items = orders::items(&mut self.tx, order_id).await?;
        let packs = orders::pack_items(&mut self.tx, order_id).await?;
        Ok(Some(OrderAggregate {
            order,
            items: items.into_iter().map(ItemLine::from).collect(),
            packs: packs.into_iter().map(PackLine::from).collect(),
        }))
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_order(&mut self, order_id: &str) -> Result<Option<OrderAggregate>, StoreError> {
        self.load_aggregate(order_id).await
    }

    async fn lock_payment_by_charge(
        &mut self,
        provider: &str,
        charge_id: &str,
    ) -> Result<Option<PaymentAggregate>, StoreError> {
        let Some(row) = payments::lock_by_charge(&mut self.tx, provider, charge_id).await? else {
            return Ok(None);
        };
        let payment = Payment::try_from(row)?;
        let order = self
            .load_aggregate(&payment.order_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt {
                table: "payments",
                id: payment.id.clone(),
                reason: format!("unknown order {}", payment.order_id),
            })?;
        Ok(Some(PaymentAggregate { payment, order }))
    }

    async fn mark_order_paid(
        &mut self,
        order_id: &str,
        paid_at: i64,
        provider_reference: &str,
    ) -> Result<(), StoreError> {
        orders::mark_paid(&mut self.tx, order_id, paid_at, provider_reference).await?;
        Ok(())
    }

    async fn set_order_status(
        &mut self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        orders::update_status(&mut self.tx, order_id, status.as_db()).await?;
        Ok(())
    }

    async fn insert_payment_if_absent(&mut self, payment: &NewPayment) -> Result<bool, StoreError> {
        Ok(payments::insert_if_absent(&mut self.tx, &new_id(), payment).await?)
    }

    async fn update_payment_status(
        &mut self,
        payment_id: &str,
        status: PaymentStatus,
    ) -> Result<(), StoreError> {
        payments::update_status(&mut self.tx, payment_id, status.as_db()).await?;
        Ok(())
    }

    async fn adjust_workflow_sales(
        &mut self,
        workflow_id: &str,
        delta: i64,
    ) -> Result<(), StoreError> {
        if catalog::adjust_workflow_sales(&mut self.tx, workflow_id, delta).await? == 0 {
            tracing::warn!(workflow_id, delta, "Sales update matched no workflow");
        }
        Ok(())
    }

    async fn adjust_pack_sales(&mut self, pack_id: &str, delta: i64) -> Result<(), StoreError> {
        if catalog::adjust_pack_sales(&mut self.tx, pack_id, delta).await? == 0 {
            tracing::warn!(pack_id, delta, "Sales update matched no pack");
        }
        Ok(())
    }

    async fn lock_cart(&mut self, cart_id: &str) -> Result<bool, StoreError> {
        Ok(carts::lock(&mut self.tx, cart_id).await?)
    }

    async fn delete_cart(&mut self, cart_id: &str) -> Result<u64, StoreError> {
        Ok(carts::delete(&mut self.tx, cart_id).await?)
    }

    async fn delete_carts_for_buyer(&mut self, buyer_id: &str) -> Result<u64, StoreError> {
        Ok(carts::delete_for_buyer(&mut self.tx, buyer_id).await?)
    }

    async fn count_correlated_pending(
        &mut self,
        correlation: &CheckoutCorrelation,
    ) -> Result<i64, StoreError> {
        Ok(orders::count_correlated_pending(&mut self.tx, correlation).await?)
    }

    async fn append_audit(&mut self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        audit::append(&mut self.tx, entry).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ReconcileStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn buyer_display_name(&self, buyer_id: &str) -> Result<Option<String>, StoreError> {
        Ok(users::display_name(&self.pool, buyer_id).await?)
    }
}

#[async_trait]
impl EventLedger for PgStore {
    async fn has_processed(&self, event_id: &str) -> Result<bool, StoreError> {
        Ok(processed_events::exists(&self.pool, event_id).await?)
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        event_type: &str,
        now: i64,
    ) -> Result<(), StoreError> {
        processed_events::mark(&self.pool, event_id, event_type, now).await?;
        Ok(())
    }

    async fn purge_before(&self, cutoff: i64) -> Result<u64, StoreError> {
        Ok(processed_events::purge_before(&self.pool, cutoff).await?)
    }
}
