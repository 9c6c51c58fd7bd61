use sqlx::SqlitePool;

use crate::counter::CounterKey;
use crate::error::Error;
use crate::shard::{Shard, ShardType};

/// All shards for `(queue, region, type)` in pointer time order.
pub async fn list(
    db: &SqlitePool,
    queue_name: &str,
    region: &str,
    shard_type: ShardType,
) -> Result<Vec<Shard>, Error> {
    Ok(sqlx::query_as(
        "
        SELECT queue_name, region, shard_type, shard_id, pointer FROM shards
        WHERE queue_name = $1 AND region = $2 AND shard_type = $3
        ORDER BY shard_id ASC
        ",
    )
    .bind(queue_name)
    .bind(region)
    .bind(shard_type)
    .fetch_all(&mut *db.acquire().await?)
    .await?)
}

/// Register a shard. Losing an allocation race is fine; both shards stay.
pub async fn insert(db: &SqlitePool, shard: &Shard) -> Result<(), Error> {
    sqlx::query(
        "
        INSERT OR IGNORE INTO shards (queue_name, region, shard_type, shard_id, pointer)
        VALUES ($1, $2, $3, $4, $5)
        ",
    )
    .bind(&shard.queue_name)
    .bind(&shard.region)
    .bind(shard.shard_type)
    .bind(shard.shard_id)
    .bind(shard.pointer)
    .execute(&mut *db.acquire().await?)
    .await?;

    Ok(())
}

/// Fold `delta` into the persistent counter for `key`.
pub async fn add_to_counter(db: &SqlitePool, key: &CounterKey, delta: i64) -> Result<(), Error> {
    sqlx::query(
        "
        INSERT INTO shard_counters (queue_name, region, shard_type, shard_id, counter)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (queue_name, region, shard_type, shard_id)
        DO UPDATE SET counter = counter + excluded.counter
        ",
    )
    .bind(&key.queue_name)
    .bind(&key.region)
    .bind(key.shard_type)
    .bind(key.shard_id)
    .bind(delta)
    .execute(&mut *db.acquire().await?)
    .await?;

    Ok(())
}

/// Last-flushed counter value, zero when the shard has never been flushed.
pub async fn read_counter(db: &SqlitePool, key: &CounterKey) -> Result<i64, Error> {
    Ok(sqlx::query_scalar(
        "
        SELECT counter FROM shard_counters
        WHERE queue_name = $1 AND region = $2 AND shard_type = $3 AND shard_id = $4
        ",
    )
    .bind(&key.queue_name)
    .bind(&key.region)
    .bind(key.shard_type)
    .bind(key.shard_id)
    .fetch_optional(&mut *db.acquire().await?)
    .await?
    .unwrap_or(0))
}
