//! Notification dispatch adapters

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::reconcile::notify::{
    BuyerOrderConfirmed, BuyerOrderRefunded, NoticeKind, SellerNewOrder,
};
use crate::reconcile::{Notifier, NotifyError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Posts each notice as JSON to `{base}/notifications/{kind}`
pub struct HttpNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotifier {
    pub fn new(base_url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, kind: NoticeKind) -> String {
        format!("{}/notifications/{}", self.base_url, kind.as_str())
    }

    async fn post<T: Serialize + Sync>(&self, kind: NoticeKind, notice: &T) -> Result<(), NotifyError> {
        let resp = self.client.post(self.url(kind)).json(notice).send().await?;
        if !resp.status().is_success() {
            return Err(NotifyError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn seller_new_order(&self, notice: &SellerNewOrder) -> Result<(), NotifyError> {
        self.post(NoticeKind::SellerNewOrder, notice).await
    }

    async fn buyer_order_confirmed(&self, notice: &BuyerOrderConfirmed) -> Result<(), NotifyError> {
        self.post(NoticeKind::BuyerOrderConfirmed, notice).await
    }

    async fn buyer_order_refunded(&self, notice: &BuyerOrderRefunded) -> Result<(), NotifyError> {
        self.post(NoticeKind::BuyerOrderRefunded, notice).await
    }
}

/// Development fallback: notices only go to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn seller_new_order(&self, notice: &SellerNewOrder) -> Result<(), NotifyError> {
        tracing::info!(
            seller_id = %notice.seller_id,
            order_id = %notice.order_id,
            amount_cents = notice.amount_cents,
            "Seller notified of new order"
        );
        Ok(())
    }

    async fn buyer_order_confirmed(&self, notice: &BuyerOrderConfirmed) -> Result<(), NotifyError> {
        tracing::info!(
            buyer_id = %notice.buyer_id,
            order_id = %notice.order_id,
            "Buyer notified of confirmed order"
        );
        Ok(())
    }

    async fn buyer_order_refunded(&self, notice: &BuyerOrderRefunded) -> Result<(), NotifyError> {
        tracing::info!(
            buyer_id = %notice.buyer_id,
            order_id = %notice.order_id,
            amount_cents = notice.amount_cents,
            "Buyer notified of refund"
        );
        Ok(())
    }
}
