//! Idempotency ledger of processed provider events

use sqlx::PgPool;

pub async fn exists(pool: &PgPool, event_id: &str) -> Result<bool, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT event_id FROM processed_provider_events WHERE event_id = $1 AND processed",
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// Racing deliveries of one event both succeed here; the first write wins
pub async fn mark(
    pool: &PgPool,
    event_id: &str,
    event_type: &str,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO processed_provider_events (event_id, event_type, processed, processed_at)
         VALUES ($1, $2, TRUE, $3) ON CONFLICT (event_id) DO NOTHING",
    )
    .bind(event_id)
    .bind(event_type)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn purge_before(pool: &PgPool, cutoff: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM processed_provider_events WHERE processed_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
