//! Order queries

use sqlx::PgConnection;

use crate::reconcile::CheckoutCorrelation;

#[derive(sqlx::FromRow)]
pub struct OrderRow {
    pub id: String,
    pub buyer_id: String,
    pub status: String,
    pub total_cents: i64,
    pub currency: String,
    pub provider_reference: Option<String>,
    pub paid_at: Option<i64>,
    pub created_at: i64,
}

/// Order item joined with its workflow
#[derive(sqlx::FromRow)]
pub struct ItemRow {
    pub id: String,
    pub order_id: String,
    pub workflow_id: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub title: String,
    pub seller_id: String,
}

/// Pack item joined with its pack and member workflows
#[derive(sqlx::FromRow)]
pub struct PackItemRow {
    pub id: String,
    pub order_id: String,
    pub pack_id: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub title: String,
    pub seller_id: String,
    pub workflow_ids: Vec<String>,
}

/// Load an order and hold its row lock until the transaction ends
pub async fn lock(conn: &mut PgConnection, order_id: &str) -> Result<Option<OrderRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, buyer_id, status, total_cents, currency, provider_reference, paid_at, created_at
         FROM orders WHERE id = $1 FOR UPDATE",
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await
}

pub async fn items(conn: &mut PgConnection, order_id: &str) -> Result<Vec<ItemRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT oi.id, oi.order_id, oi.workflow_id, oi.quantity, oi.unit_price_cents,
                w.title, w.seller_id
         FROM order_items oi
         JOIN workflows w ON w.id = oi.workflow_id
         WHERE oi.order_id = $1
         ORDER BY oi.id",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await
}

pub async fn pack_items(
    conn: &mut PgConnection,
    order_id: &str,
) -> Result<Vec<PackItemRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT pi.id, pi.order_id, pi.pack_id, pi.quantity, pi.unit_price_cents,
                p.title, p.seller_id,
                COALESCE(
                    array_agg(pw.workflow_id ORDER BY pw.workflow_id)
                        FILTER (WHERE pw.workflow_id IS NOT NULL),
                    '{}'
                ) AS workflow_ids
         FROM pack_items pi
         JOIN packs p ON p.id = pi.pack_id
         LEFT JOIN pack_workflows pw ON pw.pack_id = pi.pack_id
         WHERE pi.order_id = $1
         GROUP BY pi.id, p.title, p.seller_id
         ORDER BY pi.id",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await
}

/// `pending -> paid`; rows in any other status are left alone
pub async fn mark_paid(
    conn: &mut PgConnection,
    order_id: &str,
    paid_at: i64,
    provider_reference: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE orders SET status = 'paid', paid_at = $2, provider_reference = $3
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(order_id)
    .bind(paid_at)
    .bind(provider_reference)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn update_status(
    conn: &mut PgConnection,
    order_id: &str,
    status: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(order_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn count_correlated_pending(
    conn: &mut PgConnection,
    correlation: &CheckoutCorrelation,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM orders
         WHERE buyer_id = $1
           AND status = 'pending'
           AND created_at BETWEEN $2 AND $3
           AND id <> $4",
    )
    .bind(&correlation.buyer_id)
    .bind(correlation.created_from)
    .bind(correlation.created_to)
    .bind(&correlation.exclude_order_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}
