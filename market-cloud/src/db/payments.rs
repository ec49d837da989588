//! Payment queries

use sqlx::PgConnection;

use crate::reconcile::store::NewPayment;

#[derive(sqlx::FromRow)]
pub struct PaymentRow {
    pub id: String,
    pub order_id: String,
    pub provider: String,
    pub provider_charge_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub processed_at: i64,
    pub raw_payload: serde_json::Value,
}

/// Earliest payment recorded for a provider charge, row-locked
pub async fn lock_by_charge(
    conn: &mut PgConnection,
    provider: &str,
    charge_id: &str,
) -> Result<Option<PaymentRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, order_id, provider, provider_charge_id, amount_cents, currency, status,
                processed_at, raw_payload
         FROM payments
         WHERE provider = $1 AND provider_charge_id = $2
         ORDER BY processed_at
         LIMIT 1
         FOR UPDATE",
    )
    .bind(provider)
    .bind(charge_id)
    .fetch_optional(conn)
    .await
}

/// Insert unless the (order, provider, charge) key already exists.
/// Returns whether a row was written.
pub async fn insert_if_absent(
    conn: &mut PgConnection,
    id: &str,
    payment: &NewPayment,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO payments
            (id, order_id, provider, provider_charge_id, amount_cents, currency, status,
             processed_at, raw_payload)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (order_id, provider, provider_charge_id) DO NOTHING",
    )
    .bind(id)
    .bind(&payment.order_id)
    .bind(&payment.provider)
    .bind(&payment.provider_charge_id)
    .bind(payment.amount_cents)
    .bind(&payment.currency)
    .bind(payment.status.as_db())
    .bind(payment.processed_at)
    .bind(&payment.raw_payload)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn update_status(
    conn: &mut PgConnection,
    payment_id: &str,
    status: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE payments SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(payment_id)
        .execute(conn)
        .await?;
    Ok(())
}
