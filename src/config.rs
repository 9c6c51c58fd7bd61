use serde::Deserialize;

pub mod defaults {
    pub const DB_PATH: &str = "shardq.db";
    pub const REGION_LOCAL: &str = "default";
    pub const INFLIGHT_TIMEOUT_MS: u64 = 5_000;
    pub const DELIVERY_DELAY_MS: u64 = 0;
    pub const SHARD_MAX_SIZE: u64 = 100_000;
    pub const COUNTER_FLUSH_INTERVAL_MS: u64 = 1_000;
    pub const COUNTER_FLUSH_THRESHOLD: i64 = 1_000;
    pub const REAPER_INTERVAL_MS: u64 = 2_000;
    pub const MAILBOX_BOUND: usize = 10_000;
    pub const REQUEST_TIMEOUT_MS: u64 = 5_000;
    pub const GC_INTERVAL_MS: u64 = 60_000;
    pub const MAX_RETENTION_MS: u64 = 86_400_000;
}

#[derive(Clone, Deserialize, Default)]
pub struct Config {
    pub db_path: Option<String>,

    /// Region this node reads and leases from.
    pub region_local: Option<String>,
    /// Regions new queues replicate pointers to. Always includes the local
    /// region.
    pub regions_replicated: Option<Vec<String>>,

    pub inflight_timeout_ms: Option<u64>,
    pub delivery_delay_ms: Option<u64>,

    pub shard_max_size: Option<u64>,
    pub counter_flush_interval_ms: Option<u64>,
    pub counter_flush_threshold: Option<i64>,

    pub reaper_interval_ms: Option<u64>,
    pub mailbox_bound: Option<usize>,
    pub request_timeout_ms: Option<u64>,

    pub gc_interval_ms: Option<u64>,
    pub max_retention_ms: Option<u64>,
}

impl Config {
    pub fn load() -> eyre::Result<Self> {
        Ok(envy::prefixed("SHARDQ_").from_env::<Self>()?)
    }

    pub fn db_path(&self) -> &str {
        self.db_path
            .as_ref()
            .map(|s| s.as_str())
            .unwrap_or(defaults::DB_PATH)
    }

    pub fn region_local(&self) -> &str {
        self.region_local
            .as_ref()
            .map(|s| s.as_str())
            .unwrap_or(defaults::REGION_LOCAL)
    }

    /// Replica-region set for newly created queues, local region included.
    pub fn regions_replicated(&self) -> Vec<String> {
        let mut regions = self.regions_replicated.clone().unwrap_or_default();
        let local = self.region_local().to_owned();
        if !regions.contains(&local) {
            regions.insert(0, local);
        }
        regions
    }

    pub fn inflight_timeout_ms(&self) -> u64 {
        self.inflight_timeout_ms
            .unwrap_or(defaults::INFLIGHT_TIMEOUT_MS)
    }

    pub fn delivery_delay_ms(&self) -> u64 {
        self.delivery_delay_ms.unwrap_or(defaults::DELIVERY_DELAY_MS)
    }

    pub fn shard_max_size(&self) -> u64 {
        self.shard_max_size.unwrap_or(defaults::SHARD_MAX_SIZE)
    }

    pub fn counter_flush_interval_ms(&self) -> u64 {
        self.counter_flush_interval_ms
            .unwrap_or(defaults::COUNTER_FLUSH_INTERVAL_MS)
    }

    pub fn counter_flush_threshold(&self) -> i64 {
        self.counter_flush_threshold
            .unwrap_or(defaults::COUNTER_FLUSH_THRESHOLD)
    }

    pub fn reaper_interval_ms(&self) -> u64 {
        self.reaper_interval_ms.unwrap_or(defaults::REAPER_INTERVAL_MS)
    }

    pub fn mailbox_bound(&self) -> usize {
        self.mailbox_bound.unwrap_or(defaults::MAILBOX_BOUND)
    }

    pub fn request_timeout_ms(&self) -> u64 {
        self.request_timeout_ms
            .unwrap_or(defaults::REQUEST_TIMEOUT_MS)
    }

    pub fn gc_interval_ms(&self) -> u64 {
        self.gc_interval_ms.unwrap_or(defaults::GC_INTERVAL_MS)
    }

    pub fn max_retention_ms(&self) -> u64 {
        self.max_retention_ms.unwrap_or(defaults::MAX_RETENTION_MS)
    }
}
