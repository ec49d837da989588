//! Typed reconciliation inputs
//!
//! Turns provider objects into the settlement / refund facts the state
//! machine works on. Metadata keys written at checkout:
//!
//! | key            | meaning                                   |
//! |----------------|-------------------------------------------|
//! | `order_id`     | order created at checkout                 |
//! | `buyer_id`     | purchasing user                           |
//! | `workflow_id`  | single workflow purchase                  |
//! | `pack_id`      | pack purchase (with `pack_order=true`)    |
//! | `cart_order`   | `true` for multi-item cart checkouts      |
//! | `cart_id`      | cart to clear once settled                |
//! | `multi_seller` | `true` when the cart fanned out per seller |

use std::collections::HashMap;

use super::ReconcileError;
use super::gateway::SettledCharge;
use crate::stripe::{Charge, CheckoutSession, PaymentIntent};
use crate::util::non_empty;

/// Provider event types the reconciler acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckoutCompleted,
    PaymentSucceeded,
    ChargeRefunded,
}

impl EventKind {
    pub fn from_type(event_type: &str) -> Option<Self> {
        match event_type {
            "checkout.session.completed" => Some(Self::CheckoutCompleted),
            "payment_intent.succeeded" => Some(Self::PaymentSucceeded),
            "charge.refunded" => Some(Self::ChargeRefunded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutCompleted => "checkout.session.completed",
            Self::PaymentSucceeded => "payment_intent.succeeded",
            Self::ChargeRefunded => "charge.refunded",
        }
    }

    /// Failures on a critical path ask the provider to redeliver
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::CheckoutCompleted)
    }
}

/// What the buyer paid for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseKind {
    Workflow(String),
    Pack(String),
    Cart,
}

/// Checkout metadata attached to sessions and payment intents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub order_id: String,
    pub buyer_id: String,
    pub purchase: Option<PurchaseKind>,
    pub cart_id: Option<String>,
    pub multi_seller: bool,
}

fn flag(meta: &HashMap<String, String>, key: &str) -> bool {
    meta.get(key).is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

impl CheckoutMetadata {
    /// Parse metadata; `require_purchase` demands one of the purchase kinds
    pub fn parse(
        meta: &HashMap<String, String>,
        require_purchase: bool,
    ) -> Result<Self, ReconcileError> {
        let order_id =
            non_empty(meta.get("order_id")).ok_or(ReconcileError::MissingMetadata("order_id"))?;
        let buyer_id =
            non_empty(meta.get("buyer_id")).ok_or(ReconcileError::MissingMetadata("buyer_id"))?;

        let purchase = if let Some(workflow_id) = non_empty(meta.get("workflow_id")) {
            Some(PurchaseKind::Workflow(workflow_id.to_string()))
        } else if flag(meta, "pack_order") {
            let pack_id =
                non_empty(meta.get("pack_id")).ok_or(ReconcileError::MissingMetadata("pack_id"))?;
            Some(PurchaseKind::Pack(pack_id.to_string()))
        } else if flag(meta, "cart_order") {
            Some(PurchaseKind::Cart)
        } else {
            None
        };

        if require_purchase && purchase.is_none() {
            return Err(ReconcileError::MissingMetadata("workflow_id"));
        }

        Ok(Self {
            order_id: order_id.to_string(),
            buyer_id: buyer_id.to_string(),
            purchase,
            cart_id: non_empty(meta.get("cart_id")).map(String::from),
            multi_seller: flag(meta, "multi_seller"),
        })
    }

    pub fn pack_id(&self) -> Option<&str> {
        match &self.purchase {
            Some(PurchaseKind::Pack(id)) => Some(id),
            _ => None,
        }
    }
}

/// Confirmed capture of funds for one order
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    /// Checkout session id or payment intent id
    pub provider_reference: String,
    pub charge_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub metadata: CheckoutMetadata,
    pub raw: serde_json::Value,
    pub settled_at: i64,
}

impl Settlement {
    pub fn from_checkout(
        session: &CheckoutSession,
        metadata: CheckoutMetadata,
        charge: SettledCharge,
        now: i64,
    ) -> Result<Self, ReconcileError> {
        Self {
            provider_reference: session.id.clone(),
            charge_id: charge.charge_id,
            amount_cents: session.amount_total.unwrap_or_default(),
            currency: session.currency.clone().unwrap_or_default(),
            metadata,
            raw: charge.raw,
            settled_at: now,
        }
        .validated()
    }

    pub fn from_payment_intent(
        intent: &PaymentIntent,
        metadata: CheckoutMetadata,
        raw: serde_json::Value,
        now: i64,
    ) -> Result<Self, ReconcileError> {
        Self {
            provider_reference: intent.id.clone(),
            charge_id: intent
                .latest_charge
                .clone()
                .unwrap_or_else(|| intent.id.clone()),
            amount_cents: intent.settled_amount(),
            currency: intent.currency.clone().unwrap_or_default(),
            metadata,
            raw,
            settled_at: now,
        }
        .validated()
    }

    fn validated(self) -> Result<Self, ReconcileError> {
        if self.charge_id.trim().is_empty() {
            return Err(ReconcileError::InvalidSettlement("charge id is empty"));
        }
        if self.amount_cents <= 0 {
            return Err(ReconcileError::InvalidSettlement("amount must be positive"));
        }
        if self.currency.trim().is_empty() {
            return Err(ReconcileError::InvalidSettlement("currency is missing"));
        }
        Ok(self)
    }
}

/// Refund reported against a settled charge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refund {
    pub charge_id: String,
    /// Intent the charge belongs to; intent-path settlements without a
    /// charge id are recorded under it
    pub payment_intent: Option<String>,
    /// Cumulative refunded amount
    pub amount_refunded: i64,
    pub currency: Option<String>,
    pub refunded_at: i64,
}

impl Refund {
    pub fn from_charge(charge: &Charge, now: i64) -> Self {
        Self {
            charge_id: charge.id.clone(),
            payment_intent: charge.payment_intent.clone().filter(|id| !id.is_empty()),
            amount_refunded: charge.amount_refunded,
            currency: charge.currency.clone().filter(|c| !c.is_empty()),
            refunded_at: now,
        }
    }
}
