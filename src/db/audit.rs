use sqlx::SqlitePool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLog, AuditStatus};
use crate::error::Error;
use crate::uuids;

/// Append one history row for a terminal action. Every append is a distinct
/// row; with no client request id to key on, a retried append shows up as a
/// duplicate rather than silently folding into an earlier lease cycle.
pub async fn record(
    db: &SqlitePool,
    message_id: &Uuid,
    queue_message_id: &Uuid,
    queue_name: &str,
    action: AuditAction,
    status: AuditStatus,
    error: Option<&str>,
) -> Result<(), Error> {
    sqlx::query(
        "
        INSERT INTO audit_log
            (message_id, queue_message_id, queue_name, action, status, error, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ",
    )
    .bind(message_id)
    .bind(queue_message_id)
    .bind(queue_name)
    .bind(action)
    .bind(status)
    .bind(error)
    .bind(uuids::now_millis())
    .execute(&mut *db.acquire().await?)
    .await?;

    Ok(())
}

/// Full history for one message, in append order.
pub async fn get_audit_logs(db: &SqlitePool, message_id: &Uuid) -> Result<Vec<AuditLog>, Error> {
    Ok(sqlx::query_as(
        "
        SELECT * FROM audit_log
        WHERE message_id = $1
        ORDER BY seq ASC
        ",
    )
    .bind(message_id)
    .fetch_all(&mut *db.acquire().await?)
    .await?)
}
