//! Queue definitions and statistics.
//!
//! A queue is named by a UTF-8 string unique across the system. Its pointer
//! rows live per region; the body rows are shared. Deleting a queue removes
//! all shards and pending pointers.

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use sqlx::types::Json;

/// Queue metadata as registered by `create_queue`.
#[derive(Serialize, Deserialize, FromRow, Debug, Clone)]
pub struct Queue {
    pub name: String,
    /// Region bodies are written to on send.
    pub default_region: String,
    /// All regions that hold pointer rows, default region included.
    pub regions: Json<Vec<String>>,
    pub inflight_timeout_ms: i64,
    pub delivery_delay_ms: i64,
    pub created_at: i64,
}

impl Queue {
    pub fn regions(&self) -> &[String] {
        &self.regions.0
    }
}

impl PartialEq for Queue {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Requested attributes for a new queue; unset fields fall back to the
/// node-level configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct QueueRequest {
    pub name: String,
    pub regions: Option<Vec<String>>,
    pub inflight_timeout_ms: Option<u64>,
    pub delivery_delay_ms: Option<u64>,
}

impl QueueRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = Some(regions);
        self
    }

    pub fn with_inflight_timeout_ms(mut self, ms: u64) -> Self {
        self.inflight_timeout_ms = Some(ms);
        self
    }

    pub fn with_delivery_delay_ms(mut self, ms: u64) -> Self {
        self.delivery_delay_ms = Some(ms);
        self
    }
}

/// Per-region pointer counts for one queue.
#[derive(Serialize, Deserialize, FromRow, Debug, PartialEq)]
pub struct QueueStatistics {
    pub name: String,
    pub region: String,
    /// Pointers pending delivery.
    pub available: i64,
    /// Pointers leased to consumers.
    pub inflight: i64,
}
