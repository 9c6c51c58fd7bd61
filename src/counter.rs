//! Shard counters: per-shard message counts used as a sizing signal.
//!
//! Increments accumulate in memory and are folded into the persistent
//! counter periodically, or immediately once a key's pending delta passes
//! the flush threshold. Counters are hints: a crash loses at most the
//! unflushed deltas, and nothing consults them for correctness.

use dashmap::DashMap;
use sqlx::SqlitePool;

use crate::db;
use crate::error::Error;
use crate::shard::{Shard, ShardType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub queue_name: String,
    pub region: String,
    pub shard_type: ShardType,
    pub shard_id: i64,
}

impl CounterKey {
    pub fn new(
        queue_name: impl Into<String>,
        region: impl Into<String>,
        shard_type: ShardType,
        shard_id: i64,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            region: region.into(),
            shard_type,
            shard_id,
        }
    }
}

impl From<&Shard> for CounterKey {
    fn from(shard: &Shard) -> Self {
        Self::new(
            shard.queue_name.clone(),
            shard.region.clone(),
            shard.shard_type,
            shard.shard_id,
        )
    }
}

pub struct ShardCounters {
    db: SqlitePool,
    deltas: DashMap<CounterKey, i64>,
    flush_threshold: i64,
}

impl ShardCounters {
    pub fn new(db: SqlitePool, flush_threshold: i64) -> Self {
        Self {
            db,
            deltas: DashMap::new(),
            flush_threshold,
        }
    }

    /// Accumulate `delta` for `key`. The write is in-memory; the persistent
    /// counter catches up on the next flush, or immediately if the pending
    /// delta for this key passes the threshold.
    pub async fn add(&self, key: CounterKey, delta: i64) -> Result<(), Error> {
        let pending = {
            let mut entry = self.deltas.entry(key.clone()).or_insert(0);
            *entry += delta;
            *entry
        };

        if pending.abs() > self.flush_threshold {
            self.flush_key(&key).await?;
        }

        Ok(())
    }

    /// Current count for `key`: the last-flushed value plus any pending
    /// delta. Still a hint, never authoritative.
    pub async fn count(&self, key: &CounterKey) -> Result<i64, Error> {
        let flushed = db::shard::read_counter(&self.db, key).await?;
        let pending = self.deltas.get(key).map(|d| *d).unwrap_or(0);
        Ok(flushed + pending)
    }

    /// Commit every pending delta. A failed write is logged and its delta
    /// dropped; counters tolerate the loss.
    pub async fn flush(&self) {
        let keys: Vec<CounterKey> = self.deltas.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Err(err) = self.flush_key(&key).await {
                tracing::warn!(queue = %key.queue_name, shard = key.shard_id, "counter flush failed: {err}");
            }
        }
    }

    async fn flush_key(&self, key: &CounterKey) -> Result<(), Error> {
        let Some((key, delta)) = self.deltas.remove(key) else {
            return Ok(());
        };
        if delta == 0 {
            return Ok(());
        }
        db::shard::add_to_counter(&self.db, &key, delta).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = db::connect(dir.path().join("counters.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn count_includes_pending_deltas() {
        let (db, _dir) = setup().await;
        let counters = ShardCounters::new(db, 1_000);
        let key = CounterKey::new("q", "r", ShardType::Available, 42);

        counters.add(key.clone(), 3).await.unwrap();
        assert_eq!(counters.count(&key).await.unwrap(), 3);

        counters.add(key.clone(), -1).await.unwrap();
        assert_eq!(counters.count(&key).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn flush_moves_deltas_to_storage() {
        let (db, _dir) = setup().await;
        let counters = ShardCounters::new(db.clone(), 1_000);
        let key = CounterKey::new("q", "r", ShardType::Available, 7);

        counters.add(key.clone(), 5).await.unwrap();
        counters.flush().await;

        assert_eq!(db::shard::read_counter(&db, &key).await.unwrap(), 5);
        assert_eq!(counters.count(&key).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn threshold_triggers_immediate_flush() {
        let (db, _dir) = setup().await;
        let counters = ShardCounters::new(db.clone(), 2);
        let key = CounterKey::new("q", "r", ShardType::Inflight, 9);

        counters.add(key.clone(), 3).await.unwrap();
        assert_eq!(db::shard::read_counter(&db, &key).await.unwrap(), 3);
    }
}
