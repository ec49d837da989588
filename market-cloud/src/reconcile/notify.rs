//! Best-effort notifications
//!
//! Notifications run after the transaction commits. Every attempt ends up in
//! a [`NotificationReport`]; nothing here can fail a reconciliation.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use super::store::OrderAggregate;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification service returned {0}")]
    Status(u16),

    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SellerNewOrder {
    pub seller_id: String,
    pub buyer_name: String,
    pub item_title: String,
    pub amount_cents: i64,
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuyerOrderConfirmed {
    pub buyer_id: String,
    pub item_title: String,
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuyerOrderRefunded {
    pub buyer_id: String,
    pub order_id: String,
    pub amount_cents: i64,
    pub item_title: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn seller_new_order(&self, notice: &SellerNewOrder) -> Result<(), NotifyError>;

    async fn buyer_order_confirmed(&self, notice: &BuyerOrderConfirmed) -> Result<(), NotifyError>;

    async fn buyer_order_refunded(&self, notice: &BuyerOrderRefunded) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    SellerNewOrder,
    BuyerOrderConfirmed,
    BuyerOrderRefunded,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SellerNewOrder => "seller_new_order",
            Self::BuyerOrderConfirmed => "buyer_order_confirmed",
            Self::BuyerOrderRefunded => "buyer_order_refunded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub kind: NoticeKind,
    pub recipient: String,
    pub delivery: Delivery,
}

/// Result of every notification attempted for one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationReport {
    pub deliveries: Vec<DeliveryRecord>,
}

impl NotificationReport {
    pub fn record(
        &mut self,
        kind: NoticeKind,
        recipient: impl Into<String>,
        result: Result<(), NotifyError>,
    ) {
        let recipient = recipient.into();
        let delivery = match result {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                tracing::warn!(
                    kind = kind.as_str(),
                    recipient = %recipient,
                    error = %e,
                    "Notification failed"
                );
                Delivery::Failed(e.to_string())
            }
        };
        self.deliveries.push(DeliveryRecord {
            kind,
            recipient,
            delivery,
        });
    }

    pub fn sent(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| d.delivery == Delivery::Sent)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.deliveries.len() - self.sent()
    }
}

fn join_titles<'a>(titles: impl IntoIterator<Item = &'a str>, order_id: &str) -> String {
    let joined = titles.into_iter().collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        format!("Order {order_id}")
    } else {
        joined
    }
}

/// One notice per distinct seller, in order of first appearance
pub fn seller_notices(agg: &OrderAggregate, buyer_name: &str) -> Vec<SellerNewOrder> {
    let lines = agg
        .items
        .iter()
        .map(|l| {
            (
                l.seller_id.as_str(),
                l.title.as_str(),
                l.item.unit_price_cents * i64::from(l.item.quantity),
            )
        })
        .chain(agg.packs.iter().map(|l| {
            (
                l.seller_id.as_str(),
                l.title.as_str(),
                l.item.unit_price_cents * i64::from(l.item.quantity),
            )
        }))
        .collect::<Vec<_>>();

    let mut sellers: Vec<&str> = Vec::new();
    for (seller_id, _, _) in &lines {
        if !sellers.contains(seller_id) {
            sellers.push(*seller_id);
        }
    }

    sellers
        .into_iter()
        .map(|seller_id| {
            let own = lines.iter().filter(|(s, _, _)| *s == seller_id);
            SellerNewOrder {
                seller_id: seller_id.to_string(),
                buyer_name: buyer_name.to_string(),
                item_title: join_titles(own.clone().map(|(_, t, _)| *t), &agg.order.id),
                amount_cents: own.map(|(_, _, amount)| amount).sum(),
                order_id: agg.order.id.clone(),
            }
        })
        .collect()
}

pub fn buyer_confirmation(agg: &OrderAggregate) -> BuyerOrderConfirmed {
    BuyerOrderConfirmed {
        buyer_id: agg.order.buyer_id.clone(),
        item_title: join_titles(agg.titles(), &agg.order.id),
        order_id: agg.order.id.clone(),
    }
}

pub fn buyer_refund(agg: &OrderAggregate, amount_cents: i64) -> BuyerOrderRefunded {
    BuyerOrderRefunded {
        buyer_id: agg.order.buyer_id.clone(),
        order_id: agg.order.id.clone(),
        amount_cents,
        item_title: join_titles(agg.titles(), &agg.order.id),
    }
}
