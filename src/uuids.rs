//! Type-1 (time-based) UUID construction and ordering.
//!
//! Message ids, queue-message ids and shard pointers are all time-UUIDs: the
//! 60-bit timestamp in the high bits gives them a total order that
//! approximates insertion time. Raw byte order of a v1 UUID does *not* follow
//! that timestamp, so ordering and shard arithmetic go through [`ticks`].

use std::sync::OnceLock;

use chrono::Utc;
use uuid::{Context, Timestamp, Uuid};

/// Offset between the UUID (Gregorian) epoch and the Unix epoch, in 100ns
/// ticks.
const GREGORIAN_UNIX_OFFSET: i64 = 0x01B2_1DD2_1381_4000;

static NODE_ID: OnceLock<[u8; 6]> = OnceLock::new();
static CONTEXT: OnceLock<Context> = OnceLock::new();

fn node_id() -> &'static [u8; 6] {
    NODE_ID.get_or_init(rand::random)
}

fn context() -> &'static Context {
    CONTEXT.get_or_init(|| Context::new(rand::random()))
}

/// A fresh time-UUID for the current instant.
pub fn time_uuid() -> Uuid {
    let now = Utc::now();
    let ts = Timestamp::from_unix(
        context(),
        now.timestamp() as u64,
        now.timestamp_subsec_nanos(),
    );
    Uuid::new_v1(ts, node_id())
}

/// Whether `uuid` is a type-1 UUID and therefore carries a timestamp.
pub fn is_time_uuid(uuid: &Uuid) -> bool {
    uuid.get_version_num() == 1
}

/// The UUID's 60-bit timestamp in 100ns ticks since the Gregorian epoch.
///
/// This is the key a wide-column store sorts `timeuuid` columns by; shard ids
/// are derived from it so that numeric shard order equals pointer time order.
pub fn ticks(uuid: &Uuid) -> i64 {
    let b = uuid.as_bytes();
    let time_low = u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as u64;
    let time_mid = u16::from_be_bytes([b[4], b[5]]) as u64;
    let time_hi = (u16::from_be_bytes([b[6], b[7]]) & 0x0FFF) as u64;
    ((time_hi << 48) | (time_mid << 32) | time_low) as i64
}

/// Milliseconds since the Unix epoch encoded in the UUID's timestamp.
pub fn unix_millis(uuid: &Uuid) -> i64 {
    (ticks(uuid) - GREGORIAN_UNIX_OFFSET) / 10_000
}

/// Milliseconds since the Unix epoch, now.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
