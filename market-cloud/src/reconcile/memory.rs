//! In-process store
//!
//! Implements [`ReconcileStore`] and [`EventLedger`] over plain collections.
//! A transaction owns the state lock for its whole lifetime and works on a
//! copy that replaces the shared state only on commit, so concurrent
//! settlements of one order serialize exactly like row locks would.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use shared::models::{
    AuditLogEntry, Cart, Order, OrderItem, OrderStatus, Pack, PackItem, Payment, PaymentStatus,
    Workflow,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::correlation::CheckoutCorrelation;
use super::store::{
    EventLedger, ItemLine, NewPayment, OrderAggregate, PackLine, PaymentAggregate, ReconcileStore,
    StoreError, StoreTx,
};
use crate::util::new_id;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEvent {
    pub event_type: String,
    pub processed_at: i64,
}

/// Everything the store holds; public so tests can seed and inspect it
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    /// user id -> display name
    pub users: BTreeMap<String, String>,
    pub workflows: BTreeMap<String, Workflow>,
    pub packs: BTreeMap<String, Pack>,
    pub orders: BTreeMap<String, Order>,
    pub order_items: Vec<OrderItem>,
    pub pack_items: Vec<PackItem>,
    pub payments: Vec<Payment>,
    pub carts: BTreeMap<String, Cart>,
    pub audit_log: Vec<AuditLogEntry>,
    pub processed_events: BTreeMap<String, ProcessedEvent>,
}

impl MemoryState {
    pub fn sales_count(&self, workflow_id: &str) -> Option<i64> {
        self.workflows.get(workflow_id).map(|w| w.sales_count)
    }

    pub fn pack_sales_count(&self, pack_id: &str) -> Option<i64> {
        self.packs.get(pack_id).map(|p| p.sales_count)
    }

    pub fn order_status(&self, order_id: &str) -> Option<OrderStatus> {
        self.orders.get(order_id).map(|o| o.status)
    }

    pub fn payments_for(&self, order_id: &str) -> Vec<&Payment> {
        self.payments
            .iter()
            .filter(|p| p.order_id == order_id)
            .collect()
    }

    fn aggregate(&self, order_id: &str) -> Result<Option<OrderAggregate>, StoreError> {
        let Some(order) = self.orders.get(order_id) else {
            return Ok(None);
        };

        let items = self
            .order_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .map(|item| {
                let workflow = self.workflows.get(&item.workflow_id).ok_or_else(|| {
                    StoreError::Corrupt {
                        table: "order_items",
                        id: item.id.clone(),
                        reason: format!("unknown workflow {}", item.workflow_id),
                    }
                })?;
                Ok(ItemLine {
                    item: item.clone(),
                    title: workflow.title.clone(),
                    seller_id: workflow.seller_id.clone(),
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let packs = self
            .pack_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .map(|item| {
                let pack = self
                    .packs
                    .get(&item.pack_id)
                    .ok_or_else(|| StoreError::Corrupt {
                        table: "pack_items",
                        id: item.id.clone(),
                        reason: format!("unknown pack {}", item.pack_id),
                    })?;
                Ok(PackLine {
                    item: item.clone(),
                    title: pack.title.clone(),
                    seller_id: pack.seller_id.clone(),
                    workflow_ids: pack.workflow_ids.clone(),
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(Some(OrderAggregate {
            order: order.clone(),
            items,
            packs,
        }))
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_audit: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate state outside of any transaction
    pub async fn seed(&self, f: impl FnOnce(&mut MemoryState)) {
        let mut state = self.state.lock().await;
        f(&mut state);
    }

    /// Copy of the committed state
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Make audit appends fail, to exercise rollback
    pub fn fail_audit_appends(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
    fail_audit: bool,
}

fn adjust(count: &mut i64, delta: i64) {
    *count = count.saturating_add(delta).max(0);
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_order(&mut self, order_id: &str) -> Result<Option<OrderAggregate>, StoreError> {
        self.work.aggregate(order_id)
    }

    async fn lock_payment_by_charge(
        &mut self,
        provider: &str,
        charge_id: &str,
    ) -> Result<Option<PaymentAggregate>, StoreError> {
        let Some(payment) = self
            .work
            .payments
            .iter()
            .filter(|p| p.provider == provider && p.provider_charge_id == charge_id)
            .min_by_key(|p| p.processed_at)
            .cloned()
        else {
            return Ok(None);
        };

        let order = self
            .work
            .aggregate(&payment.order_id)?
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
        if let Some(order) = self.work.orders.get_mut(order_id)
            && order.status == OrderStatus::Pending
        {
            order.status = OrderStatus::Paid;
            order.paid_at = Some(paid_at);
            order.provider_reference = Some(provider_reference.to_string());
        }
        Ok(())
    }

    async fn set_order_status(
        &mut self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        if let Some(order) = self.work.orders.get_mut(order_id) {
            order.status = status;
        }
        Ok(())
    }

    async fn insert_payment_if_absent(&mut self, payment: &NewPayment) -> Result<bool, StoreError> {
        let exists = self.work.payments.iter().any(|p| {
            p.order_id == payment.order_id
                && p.provider == payment.provider
                && p.provider_charge_id == payment.provider_charge_id
        });
        if exists {
            return Ok(false);
        }
        self.work.payments.push(Payment {
            id: new_id(),
            order_id: payment.order_id.clone(),
            provider: payment.provider.clone(),
            provider_charge_id: payment.provider_charge_id.clone(),
            amount_cents: payment.amount_cents,
            currency: payment.currency.clone(),
            status: payment.status,
            processed_at: payment.processed_at,
            raw_payload: payment.raw_payload.clone(),
        });
        Ok(true)
    }

    async fn update_payment_status(
        &mut self,
        payment_id: &str,
        status: PaymentStatus,
    ) -> Result<(), StoreError> {
        if let Some(payment) = self.work.payments.iter_mut().find(|p| p.id == payment_id) {
            payment.status = status;
        }
        Ok(())
    }

    async fn adjust_workflow_sales(
        &mut self,
        workflow_id: &str,
        delta: i64,
    ) -> Result<(), StoreError> {
        if let Some(workflow) = self.work.workflows.get_mut(workflow_id) {
            adjust(&mut workflow.sales_count, delta);
        }
        Ok(())
    }

    async fn adjust_pack_sales(&mut self, pack_id: &str, delta: i64) -> Result<(), StoreError> {
        if let Some(pack) = self.work.packs.get_mut(pack_id) {
            adjust(&mut pack.sales_count, delta);
        }
        Ok(())
    }

    async fn lock_cart(&mut self, cart_id: &str) -> Result<bool, StoreError> {
        Ok(self.work.carts.contains_key(cart_id))
    }

    async fn delete_cart(&mut self, cart_id: &str) -> Result<u64, StoreError> {
        Ok(u64::from(self.work.carts.remove(cart_id).is_some()))
    }

    async fn delete_carts_for_buyer(&mut self, buyer_id: &str) -> Result<u64, StoreError> {
        let before = self.work.carts.len();
        self.work.carts.retain(|_, cart| cart.buyer_id != buyer_id);
        Ok((before - self.work.carts.len()) as u64)
    }

    async fn count_correlated_pending(
        &mut self,
        correlation: &CheckoutCorrelation,
    ) -> Result<i64, StoreError> {
        Ok(self
            .work
            .orders
            .values()
            .filter(|o| correlation.matches(o))
            .count() as i64)
    }

    async fn append_audit(&mut self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        if self.fail_audit {
            return Err(StoreError::Unavailable("audit log rejected the entry".into()));
        }
        self.work.audit_log.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            mut guard, work, ..
        } = *self;
        *guard = work;
        Ok(())
    }
}

#[async_trait]
impl ReconcileStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            work,
            fail_audit: self.fail_audit.load(Ordering::SeqCst),
        }))
    }

    async fn buyer_display_name(&self, buyer_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state.lock().await.users.get(buyer_id).cloned())
    }
}

#[async_trait]
impl EventLedger for MemoryStore {
    async fn has_processed(&self, event_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .processed_events
            .contains_key(event_id))
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        event_type: &str,
        now: i64,
    ) -> Result<(), StoreError> {
        self.state
            .lock()
            .await
            .processed_events
            .entry(event_id.to_string())
            .or_insert_with(|| ProcessedEvent {
                event_type: event_type.to_string(),
                processed_at: now,
            });
        Ok(())
    }

    async fn purge_before(&self, cutoff: i64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.processed_events.len();
        state
            .processed_events
            .retain(|_, event| event.processed_at >= cutoff);
        Ok((before - state.processed_events.len()) as u64)
    }
}
