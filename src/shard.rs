//! Shard identity.
//!
//! A shard is one partition of pointer rows, addressed by
//! `(queue, region, type, shard_id)`. Shards are append-only: new ones are
//! created with a fresh time-UUID pointer and old ones remain readable.

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::uuids;

/// Which pointer family a shard partitions: pending-delivery rows or leased
/// rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ShardType {
    Available,
    Inflight,
}

impl ShardType {
    /// Pointer table backing this shard family.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Available => "messages_available",
            Self::Inflight => "messages_inflight",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Shard {
    pub queue_name: String,
    pub region: String,
    pub shard_type: ShardType,
    /// Derived from `pointer`, so numeric order equals pointer time order.
    pub shard_id: i64,
    pub pointer: Uuid,
}

impl Shard {
    /// A new shard anchored at `pointer`. All pointer rows with a time-UUID
    /// at or after `pointer` (and before the next shard's) land here.
    pub fn new(
        queue_name: impl Into<String>,
        region: impl Into<String>,
        shard_type: ShardType,
        pointer: Uuid,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            region: region.into(),
            shard_type,
            shard_id: uuids::ticks(&pointer),
            pointer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_id_follows_pointer_order() {
        let a = Shard::new("q", "r", ShardType::Available, uuids::time_uuid());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = Shard::new("q", "r", ShardType::Available, uuids::time_uuid());
        assert!(a.shard_id < b.shard_id);
    }

    #[test]
    fn table_names() {
        assert_eq!(ShardType::Available.table(), "messages_available");
        assert_eq!(ShardType::Inflight.table(), "messages_inflight");
    }
}
