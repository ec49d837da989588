//! Reconciliation state machine
//!
//! Total functions from (locked order state, event facts) to a
//! [`Transition`]: the outcome plus the ordered commands the engine runs
//! inside the transaction. Nothing here touches the store.
//!
//! ```text
//! settle:  pending ──> paid                   (+ payment, sales, cart, audit)
//!          paid | partial_refund | refunded   AlreadySettled, no commands
//!          cancelled | failed                 Ignored, no commands
//!
//! refund:  paid | partial_refund ──> refunded        (full, every settle increment reversed)
//!          paid | partial_refund ──> partial_refund  (partial, sales untouched)
//!          payment already refunded                  AlreadyRefunded
//! ```

use serde_json::json;
use shared::models::{AuditAction, AuditLogEntry, Order, OrderStatus, PaymentStatus};

use super::correlation::CheckoutCorrelation;
use super::event::{CheckoutMetadata, Refund, Settlement};
use super::store::{NewPayment, OrderAggregate, PaymentAggregate};
use crate::stripe::PROVIDER;

/// Actor recorded for provider-initiated changes
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    MarkOrderPaid {
        order_id: String,
        paid_at: i64,
        provider_reference: String,
    },
    SetOrderStatus {
        order_id: String,
        status: OrderStatus,
    },
    RecordPayment(NewPayment),
    SetPaymentStatus {
        payment_id: String,
        status: PaymentStatus,
    },
    AdjustWorkflowSales {
        workflow_id: String,
        delta: i64,
    },
    AdjustPackSales {
        pack_id: String,
        delta: i64,
    },
    CleanupCart(CartCleanup),
    AppendAudit(AuditLogEntry),
}

/// How the buyer's cart is cleared after a settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartCleanup {
    /// Multi-seller checkout: delete once no sibling order is pending
    WhenCheckoutSettled {
        cart_id: String,
        correlation: CheckoutCorrelation,
    },
    Delete {
        cart_id: String,
    },
    /// No cart named in metadata
    DeleteForBuyer {
        buyer_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Settled,
    AlreadySettled,
    /// Order is in a status settlement must not touch
    Ignored(OrderStatus),
    Refunded {
        full: bool,
    },
    AlreadyRefunded,
    SkippedTestOrder,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Settled => "settled",
            Self::AlreadySettled => "already_settled",
            Self::Ignored(_) => "ignored",
            Self::Refunded { full: true } => "refunded",
            Self::Refunded { full: false } => "partially_refunded",
            Self::AlreadyRefunded => "already_refunded",
            Self::SkippedTestOrder => "skipped_test_order",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub outcome: Outcome,
    pub commands: Vec<Command>,
}

impl Transition {
    pub fn noop(outcome: Outcome) -> Self {
        Self {
            outcome,
            commands: Vec::new(),
        }
    }
}

/// Settle a locked order with a confirmed payment
pub fn settle(agg: &OrderAggregate, settlement: &Settlement) -> Transition {
    let order = &agg.order;
    match order.status {
        OrderStatus::Pending => {}
        status if status.is_settled() => return Transition::noop(Outcome::AlreadySettled),
        status => return Transition::noop(Outcome::Ignored(status)),
    }

    let mut commands = vec![
        Command::MarkOrderPaid {
            order_id: order.id.clone(),
            paid_at: settlement.settled_at,
            provider_reference: settlement.provider_reference.clone(),
        },
        Command::RecordPayment(NewPayment {
            order_id: order.id.clone(),
            provider: PROVIDER.to_string(),
            provider_charge_id: settlement.charge_id.clone(),
            amount_cents: settlement.amount_cents,
            currency: settlement.currency.clone(),
            status: PaymentStatus::Succeeded,
            processed_at: settlement.settled_at,
            raw_payload: settlement.raw.clone(),
        }),
    ];

    commands.extend(sales_commands(agg, 1));
    commands.push(Command::CleanupCart(cart_cleanup(
        &settlement.metadata,
        order,
    )));
    commands.push(Command::AppendAudit(settlement_audit(agg, settlement)));

    Transition {
        outcome: Outcome::Settled,
        commands,
    }
}

/// Apply a refund to a locked payment
pub fn refund(agg: &PaymentAggregate, refund: &Refund) -> Transition {
    let payment = &agg.payment;
    if payment.status == PaymentStatus::Refunded {
        return Transition::noop(Outcome::AlreadyRefunded);
    }

    let full = refund.amount_refunded >= payment.amount_cents;
    let order = &agg.order.order;
    let (payment_status, order_status, action) = if full {
        (
            PaymentStatus::Refunded,
            OrderStatus::Refunded,
            AuditAction::OrderRefunded,
        )
    } else {
        (
            PaymentStatus::PartialRefund,
            OrderStatus::PartialRefund,
            AuditAction::OrderPartialRefund,
        )
    };

    let mut commands = vec![Command::SetPaymentStatus {
        payment_id: payment.id.clone(),
        status: payment_status,
    }];

    if order.status.can_transition_to(order_status) {
        commands.push(Command::SetOrderStatus {
            order_id: order.id.clone(),
            status: order_status,
        });
        // Only a full refund gives the sale back; counters move once with the order
        if full {
            commands.extend(sales_commands(&agg.order, -1));
        }
    }

    commands.push(Command::AppendAudit(AuditLogEntry {
        actor: SYSTEM_ACTOR.to_string(),
        action,
        entity_type: "order".to_string(),
        entity_id: order.id.clone(),
        metadata: json!({
            "refund_amount": refund.amount_refunded,
            "charge_id": refund.charge_id,
            "currency": refund.currency.as_deref().unwrap_or(&payment.currency),
            "payment_id": payment.id,
        }),
        created_at: refund.refunded_at,
    }));

    Transition {
        outcome: Outcome::Refunded { full },
        commands,
    }
}

/// Counter adjustments for every line of `agg`, scaled by `sign`
fn sales_commands(agg: &OrderAggregate, sign: i64) -> Vec<Command> {
    let mut commands = Vec::new();
    for line in &agg.items {
        commands.push(Command::AdjustWorkflowSales {
            workflow_id: line.item.workflow_id.clone(),
            delta: sign * i64::from(line.item.quantity),
        });
    }

    // A pack sale also counts toward every bundled workflow
    for line in &agg.packs {
        let delta = sign * i64::from(line.item.quantity);
        commands.push(Command::AdjustPackSales {
            pack_id: line.item.pack_id.clone(),
            delta,
        });
        for workflow_id in &line.workflow_ids {
            commands.push(Command::AdjustWorkflowSales {
                workflow_id: workflow_id.clone(),
                delta,
            });
        }
    }
    commands
}

/// Pick the cart cleanup rule for a settled order
pub fn cart_cleanup(metadata: &CheckoutMetadata, order: &Order) -> CartCleanup {
    match (&metadata.cart_id, metadata.multi_seller) {
        (Some(cart_id), true) => CartCleanup::WhenCheckoutSettled {
            cart_id: cart_id.clone(),
            correlation: CheckoutCorrelation::for_order(order),
        },
        (Some(cart_id), false) => CartCleanup::Delete {
            cart_id: cart_id.clone(),
        },
        (None, _) => CartCleanup::DeleteForBuyer {
            buyer_id: order.buyer_id.clone(),
        },
    }
}

fn settlement_audit(agg: &OrderAggregate, settlement: &Settlement) -> AuditLogEntry {
    let order = &agg.order;
    let (action, entity_type, entity_id) = match agg.packs.first() {
        Some(first) => (
            AuditAction::PackPurchased,
            "pack",
            settlement
                .metadata
                .pack_id()
                .unwrap_or(&first.item.pack_id)
                .to_string(),
        ),
        None => (AuditAction::OrderCompleted, "order", order.id.clone()),
    };

    AuditLogEntry {
        actor: order.buyer_id.clone(),
        action,
        entity_type: entity_type.to_string(),
        entity_id,
        metadata: json!({
            "amount": settlement.amount_cents,
            "currency": settlement.currency,
            "session_id": settlement.provider_reference,
            "order_id": order.id,
            "charge_id": settlement.charge_id,
        }),
        created_at: settlement.settled_at,
    }
}
