//! Catalog sales counters
//!
//! Counters change with one `UPDATE` each so concurrent settlements and
//! refunds never lose an increment. Decrements stop at zero.

use sqlx::PgConnection;

pub async fn adjust_workflow_sales(
    conn: &mut PgConnection,
    workflow_id: &str,
    delta: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE workflows SET sales_count = GREATEST(sales_count + $2, 0) WHERE id = $1",
    )
    .bind(workflow_id)
    .bind(delta)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn adjust_pack_sales(
    conn: &mut PgConnection,
    pack_id: &str,
    delta: i64,
) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("UPDATE packs SET sales_count = GREATEST(sales_count + $2, 0) WHERE id = $1")
            .bind(pack_id)
            .bind(delta)
            .execute(conn)
            .await?;
    Ok(result.rows_affected())
}
