//! Cart cleanup

use sqlx::PgConnection;

/// `SELECT ... FOR UPDATE` on the cart row; `false` when it no longer exists
pub async fn lock(conn: &mut PgConnection, cart_id: &str) -> Result<bool, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT id FROM carts WHERE id = $1 FOR UPDATE")
        .bind(cart_id)
        .fetch_optional(conn)
        .await?;
    Ok(row.is_some())
}

pub async fn delete(conn: &mut PgConnection, cart_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM carts WHERE id = $1")
        .bind(cart_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_for_buyer(conn: &mut PgConnection, buyer_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM carts WHERE buyer_id = $1")
        .bind(buyer_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
