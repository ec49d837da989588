//! Application state for market-cloud

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::db::PgStore;
use crate::notify::{HttpNotifier, LogNotifier};
use crate::reconcile::{EventLedger, Notifier, Reconciler, TestOrderPolicy};
use crate::stripe::StripeGateway;
use crate::webhook::WebhookProcessor;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Verifies, deduplicates and reconciles webhook deliveries
    pub processor: Arc<WebhookProcessor>,
    /// Processed event ledger (also used by the purge task)
    pub ledger: Arc<dyn EventLedger>,
}

impl AppState {
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let pool = PgPool::connect(&config.database_url).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let store = Arc::new(PgStore::new(pool));
        let gateway = Arc::new(StripeGateway::new(
            config.stripe_secret_key.clone(),
            config.stripe_api_base.clone(),
        )?);

        let notifier: Arc<dyn Notifier> = match &config.notifications_url {
            Some(url) => Arc::new(HttpNotifier::new(url.clone())?),
            None => {
                tracing::warn!("NOTIFICATIONS_URL not set, notifications will only be logged");
                Arc::new(LogNotifier)
            }
        };

        let test_orders = TestOrderPolicy {
            enabled: config.allow_test_orders,
            prefix: config.test_order_prefix.clone(),
        };
        if test_orders.enabled {
            tracing::info!(prefix = %test_orders.prefix, "Test order settlements will be skipped");
        }

        let reconciler = Reconciler::new(store.clone(), gateway, notifier, test_orders);
        Ok(Self::from_parts(
            &config.stripe_webhook_secret,
            config.webhook_tolerance_secs,
            store,
            reconciler,
        ))
    }

    /// Assemble state around an existing ledger and reconciler
    pub fn from_parts(
        webhook_secret: &str,
        tolerance_secs: i64,
        ledger: Arc<dyn EventLedger>,
        reconciler: Reconciler,
    ) -> Self {
        let processor = WebhookProcessor::new(
            webhook_secret,
            tolerance_secs,
            ledger.clone(),
            reconciler,
        );
        Self {
            processor: Arc::new(processor),
            ledger,
        }
    }
}
