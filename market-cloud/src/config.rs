//! Reconciliation service configuration

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// HTTP port (webhook + health)
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// Stripe REST base URL
    pub stripe_api_base: String,
    /// Maximum accepted age of a webhook signature timestamp
    pub webhook_tolerance_secs: i64,
    /// Notification service base URL; log-only dispatch when unset
    pub notifications_url: Option<String>,
    /// Skip settlements for unknown orders carrying the test prefix
    pub allow_test_orders: bool,
    pub test_order_prefix: String,
    /// How long processed event ids are kept in the ledger
    pub processed_event_retention_days: i64,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let is_development = environment == "development";

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            http_port: Self::parse_or("HTTP_PORT", 8080),
            stripe_secret_key: Self::require_secret("STRIPE_SECRET_KEY", &environment)?,
            stripe_webhook_secret: Self::require_secret("STRIPE_WEBHOOK_SECRET", &environment)?,
            stripe_api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".into()),
            webhook_tolerance_secs: Self::parse_or("WEBHOOK_TOLERANCE_SECS", 300),
            notifications_url: std::env::var("NOTIFICATIONS_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            allow_test_orders: Self::parse_or("ALLOW_TEST_ORDERS", is_development),
            test_order_prefix: std::env::var("TEST_ORDER_PREFIX")
                .unwrap_or_else(|_| "test_".into()),
            processed_event_retention_days: Self::parse_or("PROCESSED_EVENT_RETENTION_DAYS", 30),
            environment,
        })
    }
}
