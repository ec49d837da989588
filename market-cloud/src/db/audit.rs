//! Audit log operations

use shared::models::AuditLogEntry;
use sqlx::PgConnection;

/// Append an audit log entry inside the caller's transaction
pub async fn append(conn: &mut PgConnection, entry: &AuditLogEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO audit_logs (actor, action, entity_type, entity_id, metadata, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(&entry.actor)
    .bind(entry.action.as_str())
    .bind(&entry.entity_type)
    .bind(&entry.entity_id)
    .bind(&entry.metadata)
    .bind(entry.created_at)
    .execute(conn)
    .await?;
    Ok(())
}
