use std::sync::Arc;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::counter::{CounterKey, ShardCounters};
use crate::error::Error;
use crate::message::{MessageBody, QueueMessage};
use crate::shard::ShardType;
use crate::strategy::ShardStrategy;
use crate::uuids;

/// CRUD of pointer rows and body rows.
///
/// Pointer writes and deletes resolve their shard through the shard strategy
/// when the caller does not already know it, and keep the shard counters in
/// step (+1 per insert, -1 per delete).
#[derive(Clone)]
pub struct MessageStore {
    db: SqlitePool,
    strategy: Arc<ShardStrategy>,
    counters: Arc<ShardCounters>,
}

impl MessageStore {
    pub fn new(db: SqlitePool, strategy: Arc<ShardStrategy>, counters: Arc<ShardCounters>) -> Self {
        Self {
            db,
            strategy,
            counters,
        }
    }

    /// Insert a pointer row into the available or inflight family. Fills in
    /// `shard_id` via the strategy when unset and bumps the shard counter.
    pub async fn write_message(
        &self,
        shard_type: ShardType,
        message: &mut QueueMessage,
    ) -> Result<Uuid, Error> {
        let shard_id = match message.shard_id {
            Some(id) => id,
            None => {
                let shard = self
                    .strategy
                    .select_shard(
                        &message.queue_name,
                        &message.region,
                        shard_type,
                        &message.queue_message_id,
                    )
                    .await?;
                message.shard_id = Some(shard.shard_id);
                shard.shard_id
            }
        };

        sqlx::query(&format!(
            "
            INSERT OR REPLACE INTO {}
                (queue_name, region, shard_id, queue_message_id, message_ts,
                 message_id, queued_at, inflight_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
            shard_type.table()
        ))
        .bind(&message.queue_name)
        .bind(&message.region)
        .bind(shard_id)
        .bind(message.queue_message_id)
        .bind(uuids::ticks(&message.queue_message_id))
        .bind(message.message_id)
        .bind(message.queued_at)
        .bind(message.inflight_at)
        .execute(&mut *self.db.acquire().await?)
        .await?;

        self.counters
            .add(
                CounterKey::new(
                    message.queue_name.clone(),
                    message.region.clone(),
                    shard_type,
                    shard_id,
                ),
                1,
            )
            .await?;

        Ok(message.queue_message_id)
    }

    /// Point-query one pointer row; `None` when absent.
    pub async fn load_message(
        &self,
        queue_name: &str,
        region: &str,
        shard_id: Option<i64>,
        shard_type: ShardType,
        queue_message_id: &Uuid,
    ) -> Result<Option<QueueMessage>, Error> {
        let shard_id = match shard_id {
            Some(id) => id,
            None => {
                self.strategy
                    .select_shard(queue_name, region, shard_type, queue_message_id)
                    .await?
                    .shard_id
            }
        };

        Ok(sqlx::query_as(&format!(
            "
            SELECT * FROM {}
            WHERE queue_name = $1 AND region = $2 AND shard_id = $3 AND queue_message_id = $4
            ",
            shard_type.table()
        ))
        .bind(queue_name)
        .bind(region)
        .bind(shard_id)
        .bind(queue_message_id)
        .fetch_optional(&mut *self.db.acquire().await?)
        .await?)
    }

    /// Delete one pointer row and decrement its shard counter. Deleting an
    /// absent row is a no-op.
    pub async fn delete_message(
        &self,
        queue_name: &str,
        region: &str,
        shard_id: Option<i64>,
        shard_type: ShardType,
        queue_message_id: &Uuid,
    ) -> Result<(), Error> {
        let shard_id = match shard_id {
            Some(id) => id,
            None => {
                self.strategy
                    .select_shard(queue_name, region, shard_type, queue_message_id)
                    .await?
                    .shard_id
            }
        };

        let result = sqlx::query(&format!(
            "
            DELETE FROM {}
            WHERE queue_name = $1 AND region = $2 AND shard_id = $3 AND queue_message_id = $4
            ",
            shard_type.table()
        ))
        .bind(queue_name)
        .bind(region)
        .bind(shard_id)
        .bind(queue_message_id)
        .execute(&mut *self.db.acquire().await?)
        .await?;

        if result.rows_affected() > 0 {
            self.counters
                .add(
                    CounterKey::new(queue_name, region, shard_type, shard_id),
                    -1,
                )
                .await?;
        }

        Ok(())
    }

    /// One page of pointer rows from a single shard, in time-UUID order,
    /// restricted to rows actionable at `eligible_at` (visible rows in the
    /// available family, expired leases in the inflight family). The cursor
    /// is the last `(message_ts, queue_message_id)` seen.
    pub async fn scan_shard(
        &self,
        queue_name: &str,
        region: &str,
        shard_id: i64,
        shard_type: ShardType,
        eligible_at: i64,
        cursor: Option<(i64, Uuid)>,
        limit: i64,
    ) -> Result<Vec<QueueMessage>, Error> {
        let (cursor_ts, cursor_id) = cursor.unwrap_or((i64::MIN, Uuid::nil()));

        Ok(sqlx::query_as(&format!(
            "
            SELECT * FROM {}
            WHERE queue_name = $1 AND region = $2 AND shard_id = $3
              AND inflight_at <= $4
              AND (message_ts > $5 OR (message_ts = $5 AND queue_message_id > $6))
            ORDER BY message_ts ASC, queue_message_id ASC
            LIMIT $7
            ",
            shard_type.table()
        ))
        .bind(queue_name)
        .bind(region)
        .bind(shard_id)
        .bind(eligible_at)
        .bind(cursor_ts)
        .bind(cursor_id)
        .bind(limit)
        .fetch_all(&mut *self.db.acquire().await?)
        .await?)
    }

    /// Upsert a body row. `message_id` must be a time-UUID: the GC judges a
    /// body's age from it.
    pub async fn write_message_data(
        &self,
        message_id: &Uuid,
        body: &MessageBody,
    ) -> Result<(), Error> {
        if !uuids::is_time_uuid(message_id) {
            return Err(Error::invalid_parameter("message id is not a time-UUID"));
        }

        sqlx::query(
            "
            INSERT OR REPLACE INTO message_data (message_id, data, content_type)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(message_id)
        .bind(&body.data)
        .bind(&body.content_type)
        .execute(&mut *self.db.acquire().await?)
        .await?;

        Ok(())
    }

    pub async fn load_message_data(&self, message_id: &Uuid) -> Result<Option<MessageBody>, Error> {
        Ok(sqlx::query_as(
            "SELECT data, content_type FROM message_data WHERE message_id = $1",
        )
        .bind(message_id)
        .fetch_optional(&mut *self.db.acquire().await?)
        .await?)
    }

    pub async fn delete_message_data(&self, message_id: &Uuid) -> Result<(), Error> {
        sqlx::query("DELETE FROM message_data WHERE message_id = $1")
            .bind(message_id)
            .execute(&mut *self.db.acquire().await?)
            .await?;

        Ok(())
    }

    /// One page of body ids, cursored by `message_id`. Order is incidental;
    /// the GC only needs to visit every row eventually.
    pub async fn list_message_data_ids(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Uuid>, Error> {
        Ok(sqlx::query_scalar(
            "
            SELECT message_id FROM message_data
            WHERE message_id > $1
            ORDER BY message_id ASC
            LIMIT $2
            ",
        )
        .bind(after.unwrap_or(Uuid::nil()))
        .bind(limit)
        .fetch_all(&mut *self.db.acquire().await?)
        .await?)
    }

    /// Whether any pointer row in either family still references this body.
    pub async fn body_referenced(&self, message_id: &Uuid) -> Result<bool, Error> {
        let referenced: bool = sqlx::query_scalar(
            "
            SELECT EXISTS (SELECT 1 FROM messages_available WHERE message_id = $1)
                OR EXISTS (SELECT 1 FROM messages_inflight WHERE message_id = $1)
            ",
        )
        .bind(message_id)
        .fetch_one(&mut *self.db.acquire().await?)
        .await?;

        Ok(referenced)
    }
}
