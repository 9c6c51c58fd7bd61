//! State-machine operations for one queue in one region.
//!
//! Each operation runs inside the owning queue actor, so calls for a given
//! `(queue, region)` are serialized. The operations themselves are written
//! to tolerate the duplicates that a crash between steps can leave behind:
//! an available/inflight double is re-leased and resolved by whichever ack
//! lands, and a repeated requeue is a no-op.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditStatus};
use crate::db;
use crate::db::message::MessageStore;
use crate::error::Error;
use crate::message::QueueMessage;
use crate::service::Status;
use crate::shard::ShardType;
use crate::uuids;

const SCAN_PAGE: i64 = 100;

#[derive(Clone)]
pub struct QueueActorHelper {
    db: SqlitePool,
    store: MessageStore,
}

impl QueueActorHelper {
    pub fn new(db: SqlitePool, store: MessageStore) -> Self {
        Self { db, store }
    }

    /// Point-load one pointer row from the given family.
    pub async fn load_queue_message(
        &self,
        queue_name: &str,
        region: &str,
        shard_type: ShardType,
        queue_message_id: &Uuid,
    ) -> Result<Option<QueueMessage>, Error> {
        self.store
            .load_message(queue_name, region, None, shard_type, queue_message_id)
            .await
    }

    /// Lease an available pointer: copy it into the inflight family with a
    /// deadline of now + `inflight_timeout_ms`, remove the available row,
    /// record the GET. A crash between the two writes leaves a duplicate
    /// pointer, which at-least-once delivery absorbs.
    pub async fn put_inflight(
        &self,
        message: &QueueMessage,
        inflight_timeout_ms: i64,
    ) -> Result<QueueMessage, Error> {
        let now = uuids::now_millis();

        let mut leased = QueueMessage::new(
            message.queue_name.clone(),
            message.region.clone(),
            message.message_id,
            message.queue_message_id,
            message.queued_at,
            now + inflight_timeout_ms,
        );
        self.store
            .write_message(ShardType::Inflight, &mut leased)
            .await?;

        self.store
            .delete_message(
                &message.queue_name,
                &message.region,
                message.shard_id,
                ShardType::Available,
                &message.queue_message_id,
            )
            .await?;

        self.record_audit(message, AuditAction::Get).await;

        Ok(leased)
    }

    /// Acknowledge a leased pointer. Acking something that is not inflight
    /// is a client error and leaves no trace in the audit log.
    pub async fn ack_queue_message(
        &self,
        queue_name: &str,
        region: &str,
        queue_message_id: &Uuid,
    ) -> Result<Status, Error> {
        let Some(found) = self
            .store
            .load_message(queue_name, region, None, ShardType::Inflight, queue_message_id)
            .await?
        else {
            return Ok(Status::BadRequest);
        };

        self.store
            .delete_message(
                queue_name,
                region,
                found.shard_id,
                ShardType::Inflight,
                queue_message_id,
            )
            .await?;

        self.record_audit(&found, AuditAction::Ack).await;

        Ok(Status::Success)
    }

    /// Return a leased pointer to the available family under the same
    /// `queue_message_id` with a refreshed enqueue time. `action` records
    /// whether this was a consumer nack or a lease timeout. Idempotent: a
    /// pointer that is no longer inflight is left alone.
    pub async fn requeue(
        &self,
        queue_name: &str,
        region: &str,
        queue_message_id: &Uuid,
        action: AuditAction,
    ) -> Result<bool, Error> {
        let Some(found) = self
            .store
            .load_message(queue_name, region, None, ShardType::Inflight, queue_message_id)
            .await?
        else {
            return Ok(false);
        };

        self.store
            .delete_message(
                queue_name,
                region,
                found.shard_id,
                ShardType::Inflight,
                queue_message_id,
            )
            .await?;

        let now = uuids::now_millis();
        let mut available = QueueMessage::new(
            queue_name,
            region,
            found.message_id,
            *queue_message_id,
            now,
            now,
        );
        self.store
            .write_message(ShardType::Available, &mut available)
            .await?;

        self.record_audit(&found, action).await;

        Ok(true)
    }

    /// Up to `limit` visible pointers from the available family, oldest
    /// shard first, time-UUID order within each shard.
    pub async fn next_available(
        &self,
        queue_name: &str,
        region: &str,
        limit: usize,
    ) -> Result<Vec<QueueMessage>, Error> {
        let now = uuids::now_millis();
        let shards = db::shard::list(&self.db, queue_name, region, ShardType::Available).await?;

        let mut found = Vec::with_capacity(limit);
        for shard in shards {
            if found.len() >= limit {
                break;
            }
            let page = self
                .store
                .scan_shard(
                    queue_name,
                    region,
                    shard.shard_id,
                    ShardType::Available,
                    now,
                    None,
                    (limit - found.len()) as i64,
                )
                .await?;
            found.extend(page);
        }

        Ok(found)
    }

    /// Move every inflight pointer whose lease expired back to available.
    /// One row failing never aborts the sweep; pages yield cooperatively.
    pub async fn sweep_expired(&self, queue_name: &str, region: &str) -> Result<usize, Error> {
        let now = uuids::now_millis();
        let shards = db::shard::list(&self.db, queue_name, region, ShardType::Inflight).await?;

        let mut moved = 0;
        for shard in shards {
            let mut cursor = None;
            loop {
                let page = self
                    .store
                    .scan_shard(
                        queue_name,
                        region,
                        shard.shard_id,
                        ShardType::Inflight,
                        now,
                        cursor,
                        SCAN_PAGE,
                    )
                    .await?;
                let Some(last) = page.last() else {
                    break;
                };
                cursor = Some((
                    uuids::ticks(&last.queue_message_id),
                    last.queue_message_id,
                ));

                for expired in &page {
                    match self
                        .requeue(
                            queue_name,
                            region,
                            &expired.queue_message_id,
                            AuditAction::Timeout,
                        )
                        .await
                    {
                        Ok(true) => moved += 1,
                        Ok(false) => {}
                        Err(err) => {
                            tracing::warn!(
                                queue = queue_name,
                                queue_message_id = %expired.queue_message_id,
                                "timeout return failed: {err}"
                            );
                        }
                    }
                }

                if (page.len() as i64) < SCAN_PAGE {
                    break;
                }
                tokio::task::yield_now().await;
            }
        }

        Ok(moved)
    }

    /// Audit appends are best-effort: a failed append is logged, never
    /// surfaced to the caller.
    async fn record_audit(&self, message: &QueueMessage, action: AuditAction) {
        if let Err(err) = db::audit::record(
            &self.db,
            &message.message_id,
            &message.queue_message_id,
            &message.queue_name,
            action,
            AuditStatus::Success,
            None,
        )
        .await
        {
            tracing::warn!(
                message_id = %message.message_id,
                ?action,
                "audit append failed: {err}"
            );
        }
    }
}
