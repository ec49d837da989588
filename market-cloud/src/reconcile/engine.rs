//! Reconciler: runs state-machine transitions through the store

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::event::{CheckoutMetadata, EventKind, Refund, Settlement};
use super::gateway::PaymentGateway;
use super::machine::{self, CartCleanup, Command, Outcome};
use super::notify::{
    NoticeKind, NotificationReport, Notifier, buyer_confirmation, buyer_refund, seller_notices,
};
use super::store::{OrderAggregate, PaymentAggregate, ReconcileStore, StoreError, StoreTx};
use super::ReconcileError;
use crate::stripe::{Charge, CheckoutSession, PROVIDER, PaymentIntent};
use crate::util::now_millis;

/// Buyer name used in seller notices when the user row has none
const UNKNOWN_BUYER_NAME: &str = "A customer";

/// Settlements for unknown orders whose id carries `prefix` are skipped
/// instead of failing, when enabled. Meant for development fixtures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOrderPolicy {
    pub enabled: bool,
    pub prefix: String,
}

impl TestOrderPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            prefix: String::new(),
        }
    }

    pub fn matches(&self, order_id: &str) -> bool {
        self.enabled && !self.prefix.is_empty() && order_id.starts_with(&self.prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub outcome: Outcome,
    pub notifications: NotificationReport,
}

impl Reconciled {
    fn quiet(outcome: Outcome) -> Self {
        Self {
            outcome,
            notifications: NotificationReport::default(),
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ReconcileStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    test_orders: TestOrderPolicy,
}

fn decode<T: DeserializeOwned>(kind: &'static str, object: &Value) -> Result<T, ReconcileError> {
    T::deserialize(object).map_err(|source| ReconcileError::Decode { kind, source })
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ReconcileStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        test_orders: TestOrderPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            test_orders,
        }
    }

    /// Reconcile one recognised event from its `data.object`
    pub async fn handle(&self, kind: EventKind, object: &Value) -> Result<Reconciled, ReconcileError> {
        match kind {
            EventKind::CheckoutCompleted => {
                let session: CheckoutSession = decode("checkout session", object)?;
                self.checkout_completed(&session).await
            }
            EventKind::PaymentSucceeded => {
                let intent: PaymentIntent = decode("payment intent", object)?;
                self.payment_succeeded(&intent, object).await
            }
            EventKind::ChargeRefunded => {
                let charge: Charge = decode("charge", object)?;
                self.charge_refunded(&charge).await
            }
        }
    }

    pub async fn checkout_completed(
        &self,
        session: &CheckoutSession,
    ) -> Result<Reconciled, ReconcileError> {
        let metadata = CheckoutMetadata::parse(&session.metadata, true)?;
        let intent_id = session
            .payment_intent
            .as_deref()
            .ok_or_else(|| ReconcileError::NoPaymentIntent(session.id.clone()))?;
        let charge = self.gateway.settled_charge(intent_id).await?;
        let settlement = Settlement::from_checkout(session, metadata, charge, now_millis())?;
        self.settle(settlement).await
    }

    pub async fn payment_succeeded(
        &self,
        intent: &PaymentIntent,
        raw: &Value,
    ) -> Result<Reconciled, ReconcileError> {
        let metadata = CheckoutMetadata::parse(&intent.metadata, false)?;
        let settlement =
            Settlement::from_payment_intent(intent, metadata, raw.clone(), now_millis())?;
        self.settle(settlement).await
    }

    pub async fn charge_refunded(&self, charge: &Charge) -> Result<Reconciled, ReconcileError> {
        let refund = Refund::from_charge(charge, now_millis());

        let mut tx = self.store.begin().await?;
        let Some(agg) = lock_refunded_payment(&mut *tx, &refund).await? else {
            tracing::warn!(
                charge_id = %refund.charge_id,
                payment_intent = refund.payment_intent.as_deref().unwrap_or_default(),
                "Refund for unknown charge"
            );
            return Err(ReconcileError::PaymentNotFound(refund.charge_id));
        };

        let transition = machine::refund(&agg, &refund);
        apply(&mut *tx, &transition.commands).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %agg.order.order.id,
            charge_id = %refund.charge_id,
            refund_amount = refund.amount_refunded,
            outcome = transition.outcome.as_str(),
            "Charge refund reconciled"
        );

        if !matches!(transition.outcome, Outcome::Refunded { .. }) {
            return Ok(Reconciled::quiet(transition.outcome));
        }

        let mut notifications = NotificationReport::default();
        let notice = buyer_refund(&agg.order, refund.amount_refunded);
        let result = self.notifier.buyer_order_refunded(&notice).await;
        notifications.record(NoticeKind::BuyerOrderRefunded, &notice.buyer_id, result);

        Ok(Reconciled {
            outcome: transition.outcome,
            notifications,
        })
    }

    async fn settle(&self, settlement: Settlement) -> Result<Reconciled, ReconcileError> {
        let order_id = settlement.metadata.order_id.as_str();

        let mut tx = self.store.begin().await?;
        let Some(agg) = tx.lock_order(order_id).await? else {
            if self.test_orders.matches(order_id) {
                tracing::info!(order_id, "Skipping settlement of test order");
                return Ok(Reconciled::quiet(Outcome::SkippedTestOrder));
            }
            return Err(ReconcileError::OrderNotFound(order_id.to_string()));
        };

        if agg.order.buyer_id != settlement.metadata.buyer_id {
            tracing::warn!(
                order_id,
                order_buyer = %agg.order.buyer_id,
                metadata_buyer = %settlement.metadata.buyer_id,
                "Settlement metadata names a different buyer"
            );
        }

        let transition = machine::settle(&agg, &settlement);
        apply(&mut *tx, &transition.commands).await?;
        tx.commit().await?;

        match transition.outcome {
            Outcome::Settled => tracing::info!(
                order_id,
                charge_id = %settlement.charge_id,
                amount = settlement.amount_cents,
                currency = %settlement.currency,
                reference = %settlement.provider_reference,
                "Order settled"
            ),
            Outcome::Ignored(status) => tracing::warn!(
                order_id,
                status = %status,
                "Settlement for closed order ignored"
            ),
            other => tracing::info!(order_id, outcome = other.as_str(), "Order already settled"),
        }

        if transition.outcome != Outcome::Settled {
            return Ok(Reconciled::quiet(transition.outcome));
        }

        Ok(Reconciled {
            outcome: transition.outcome,
            notifications: self.notify_settled(&agg).await,
        })
    }

    async fn notify_settled(&self, agg: &OrderAggregate) -> NotificationReport {
        let buyer_name = match self.store.buyer_display_name(&agg.order.buyer_id).await {
            Ok(Some(name)) if !name.is_empty() => name,
            Ok(_) => UNKNOWN_BUYER_NAME.to_string(),
            Err(e) => {
                tracing::warn!(buyer_id = %agg.order.buyer_id, error = %e, "Buyer lookup failed");
                UNKNOWN_BUYER_NAME.to_string()
            }
        };

        let mut report = NotificationReport::default();

        let notices = seller_notices(agg, &buyer_name);
        let results = futures::future::join_all(
            notices
                .iter()
                .map(|notice| self.notifier.seller_new_order(notice)),
        )
        .await;
        for (notice, result) in notices.iter().zip(results) {
            report.record(NoticeKind::SellerNewOrder, &notice.seller_id, result);
        }

        let confirmation = buyer_confirmation(agg);
        let result = self.notifier.buyer_order_confirmed(&confirmation).await;
        report.record(NoticeKind::BuyerOrderConfirmed, &confirmation.buyer_id, result);

        report
    }
}

/// Payment a refund applies to: by charge id, then by the payment intent for
/// settlements that arrived without a charge id
async fn lock_refunded_payment(
    tx: &mut dyn StoreTx,
    refund: &Refund,
) -> Result<Option<PaymentAggregate>, StoreError> {
    if let Some(agg) = tx.lock_payment_by_charge(PROVIDER, &refund.charge_id).await? {
        return Ok(Some(agg));
    }
    match refund.payment_intent.as_deref() {
        Some(intent_id) => {
            let found = tx.lock_payment_by_charge(PROVIDER, intent_id).await?;
            if found.is_some() {
                tracing::debug!(
                    charge_id = %refund.charge_id,
                    payment_intent = intent_id,
                    "Refund matched payment recorded under its intent"
                );
            }
            Ok(found)
        }
        None => Ok(None),
    }
}

/// Execute commands in order inside `tx`
async fn apply(tx: &mut dyn StoreTx, commands: &[Command]) -> Result<(), StoreError> {
    for command in commands {
        match command {
            Command::MarkOrderPaid {
                order_id,
                paid_at,
                provider_reference,
            } => {
                tx.mark_order_paid(order_id, *paid_at, provider_reference)
                    .await?
            }
            Command::SetOrderStatus { order_id, status } => {
                tx.set_order_status(order_id, *status).await?
            }
            Command::RecordPayment(payment) => {
                if !tx.insert_payment_if_absent(payment).await? {
                    tracing::info!(
                        order_id = %payment.order_id,
                        charge_id = %payment.provider_charge_id,
                        "Payment already recorded"
                    );
                }
            }
            Command::SetPaymentStatus { payment_id, status } => {
                tx.update_payment_status(payment_id, *status).await?
            }
            Command::AdjustWorkflowSales { workflow_id, delta } => {
                tx.adjust_workflow_sales(workflow_id, *delta).await?
            }
            Command::AdjustPackSales { pack_id, delta } => {
                tx.adjust_pack_sales(pack_id, *delta).await?
            }
            Command::CleanupCart(cleanup) => clean_cart(tx, cleanup).await?,
            Command::AppendAudit(entry) => tx.append_audit(entry).await?,
        }
    }
    Ok(())
}

async fn clean_cart(tx: &mut dyn StoreTx, cleanup: &CartCleanup) -> Result<(), StoreError> {
    match cleanup {
        CartCleanup::WhenCheckoutSettled {
            cart_id,
            correlation,
        } => {
            // Count only after holding the cart lock so a sibling's commit is visible
            if !tx.lock_cart(cart_id).await? {
                tracing::debug!(cart_id = %cart_id, "Multi-seller cart already cleared");
                return Ok(());
            }
            let pending = tx.count_correlated_pending(correlation).await?;
            if pending == 0 {
                tx.delete_cart(cart_id).await?;
                tracing::debug!(cart_id = %cart_id, "Multi-seller cart cleared");
            } else {
                tracing::debug!(cart_id = %cart_id, pending, "Cart kept until sibling orders settle");
            }
        }
        CartCleanup::Delete { cart_id } => {
            tx.delete_cart(cart_id).await?;
        }
        CartCleanup::DeleteForBuyer { buyer_id } => {
            let deleted = tx.delete_carts_for_buyer(buyer_id).await?;
            if deleted > 0 {
                tracing::debug!(buyer_id = %buyer_id, deleted, "Buyer carts cleared");
            }
        }
    }
    Ok(())
}
