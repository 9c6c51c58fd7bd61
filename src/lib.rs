//! Sharded, region-aware, at-least-once queue substrate.
//!
//! Messages are split into a deduplicated *body* (addressed by a time-UUID
//! `message_id`) and per-region *pointer* rows that move through
//! available → inflight → acked/expired. Pointers are partitioned into
//! time-ordered shards sized by convergent counters; every `(queue, region)`
//! pair is owned by a single actor lane, so its state machine runs serially.
//! A periodic reaper returns expired leases to the available family, and an
//! append-only audit log records every terminal action.
//!
//! [`service::Service`] is the public entry point.

pub mod actor;
pub mod audit;
pub mod config;
pub mod counter;
pub mod db;
pub mod error;
pub mod message;
pub mod queue;
pub mod service;
pub mod shard;
pub mod strategy;
pub mod uuids;

pub use config::Config;
pub use error::Error;
pub use service::{Service, Status};
