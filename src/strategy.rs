//! Shard selection.
//!
//! Writes and point-reads resolve their shard the same way: list the shards
//! for `(queue, region, type)` in pointer order and take the greatest one at
//! or before the message's time-UUID. A write that finds the head shard over
//! the configured size allocates a fresh shard anchored at the triggering
//! time-UUID. Allocation races are tolerated: two concurrent allocations
//! leave two shards and readers scan both.

use std::sync::Arc;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::counter::{CounterKey, ShardCounters};
use crate::db;
use crate::error::Error;
use crate::shard::{Shard, ShardType};
use crate::uuids;

pub struct ShardStrategy {
    db: SqlitePool,
    counters: Arc<ShardCounters>,
    shard_max_size: u64,
}

impl ShardStrategy {
    pub fn new(db: SqlitePool, counters: Arc<ShardCounters>, shard_max_size: u64) -> Self {
        Self {
            db,
            counters,
            shard_max_size,
        }
    }

    /// The shard a pointer with `time_uuid` belongs to, allocating the
    /// initial or a rollover shard when needed.
    pub async fn select_shard(
        &self,
        queue_name: &str,
        region: &str,
        shard_type: ShardType,
        time_uuid: &Uuid,
    ) -> Result<Shard, Error> {
        let shards = db::shard::list(&self.db, queue_name, region, shard_type).await?;
        let ticks = uuids::ticks(time_uuid);

        if shards.is_empty() {
            let shard = Shard::new(queue_name, region, shard_type, *time_uuid);
            db::shard::insert(&self.db, &shard).await?;
            return Ok(shard);
        }

        // Shards arrive ordered by shard_id ASC, which is pointer time order.
        let head_id = shards[shards.len() - 1].shard_id;
        let chosen = shards
            .iter()
            .rev()
            .find(|s| s.shard_id <= ticks)
            .unwrap_or(&shards[0]);

        if ticks > head_id {
            let count = self.counters.count(&CounterKey::from(chosen)).await?;
            if count > self.shard_max_size as i64 {
                let shard = Shard::new(queue_name, region, shard_type, *time_uuid);
                db::shard::insert(&self.db, &shard).await?;
                return Ok(shard);
            }
        }

        Ok(chosen.clone())
    }
}
