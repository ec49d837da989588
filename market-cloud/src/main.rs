//! market-cloud: marketplace payment reconciliation service
//!
//! Long-running service that:
//! - Receives signed Stripe webhooks
//! - Settles and refunds marketplace orders exactly once per event
//! - Notifies buyers and sellers after each committed change

use std::time::Duration;

use market_cloud::api;
use market_cloud::config::Config;
use market_cloud::state::AppState;
use market_cloud::util::now_millis;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_cloud=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting market-cloud (env: {})", config.environment);

    let state = AppState::new(&config).await?;

    // Hourly purge of old processed-event ids
    let ledger = state.ledger.clone();
    let retention_ms = config.processed_event_retention_days * MILLIS_PER_DAY;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match ledger.purge_before(now_millis() - retention_ms).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Purged processed webhook events"),
                Err(e) => tracing::warn!(error = %e, "Processed event purge failed"),
            }
        }
    });

    let app = api::create_router(state);

    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("market-cloud HTTP listening on {http_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
