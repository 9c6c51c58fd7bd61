use sqlx::SqlitePool;
use tokio_stream::StreamExt as _;

use crate::error::Error;
use crate::queue::{Queue, QueueStatistics};

/// Register a queue. Returns `false` when the queue already existed; the
/// existing definition wins.
pub async fn insert(db: &SqlitePool, queue: &Queue) -> Result<bool, Error> {
    let result = sqlx::query(
        "
        INSERT OR IGNORE INTO queues
            (name, default_region, regions, inflight_timeout_ms, delivery_delay_ms, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(&queue.name)
    .bind(&queue.default_region)
    .bind(&queue.regions)
    .bind(queue.inflight_timeout_ms)
    .bind(queue.delivery_delay_ms)
    .bind(queue.created_at)
    .execute(&mut *db.acquire().await?)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn get(db: &SqlitePool, name: &str) -> Result<Option<Queue>, Error> {
    Ok(sqlx::query_as("SELECT * FROM queues WHERE name = $1")
        .bind(name)
        .fetch_optional(&mut *db.acquire().await?)
        .await?)
}

pub async fn list(db: &SqlitePool) -> Result<Vec<Queue>, Error> {
    let mut conn = db.acquire().await?;
    let mut stream = sqlx::query_as("SELECT * FROM queues ORDER BY name ASC").fetch(&mut *conn);

    let mut queues = Vec::new();

    while let Some(queue) = stream.next().await.transpose()? {
        queues.push(queue);
    }

    Ok(queues)
}

/// Remove the queue and everything that hangs off it: shards, counters and
/// pointer rows in every region. Bodies are left for the GC; the audit log
/// keeps its history.
pub async fn delete(db: &SqlitePool, name: &str) -> Result<(), Error> {
    let mut tx = db.begin().await?;

    let result = sqlx::query("DELETE FROM queues WHERE name = $1")
        .bind(name)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::queue_not_found(name));
    }

    for table in [
        "messages_available",
        "messages_inflight",
        "shards",
        "shard_counters",
    ] {
        sqlx::query(&format!("DELETE FROM {table} WHERE queue_name = $1"))
            .bind(name)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(())
}

/// Pointer counts for one queue in one region, computed from the pointer
/// tables rather than the counter hints.
pub async fn statistics(
    db: &SqlitePool,
    name: &str,
    region: &str,
) -> Result<QueueStatistics, Error> {
    Ok(sqlx::query_as(
        "
        SELECT
            q.name,
            $2 as region,
            (SELECT COUNT(*) FROM messages_available a
              WHERE a.queue_name = q.name AND a.region = $2) as available,
            (SELECT COUNT(*) FROM messages_inflight i
              WHERE i.queue_name = q.name AND i.region = $2) as inflight
        FROM queues q
        WHERE q.name = $1
        ",
    )
    .bind(name)
    .bind(region)
    .fetch_optional(&mut *db.acquire().await?)
    .await?
    .ok_or_else(|| Error::queue_not_found(name))?)
}
