//! Pointer and body models.
//!
//! A message is split in two: the *body* (opaque bytes, addressed by
//! `message_id`, shared across regions) and one or more *pointers* (light
//! rows in the available or inflight family of one queue/region/shard).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::error::Error;

/// One pointer row. `shard_id` is `None` until shard selection has run; rows
/// loaded from storage always carry it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueueMessage {
    pub queue_name: String,
    pub region: String,
    pub shard_id: Option<i64>,
    pub queue_message_id: Uuid,
    pub message_id: Uuid,
    /// Enqueue instant, ms epoch.
    pub queued_at: i64,
    /// For an available row, the instant the row becomes visible; for an
    /// inflight row, the lease deadline. Ms epoch.
    pub inflight_at: i64,
}

impl QueueMessage {
    pub fn new(
        queue_name: impl Into<String>,
        region: impl Into<String>,
        message_id: Uuid,
        queue_message_id: Uuid,
        queued_at: i64,
        inflight_at: i64,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            region: region.into(),
            shard_id: None,
            queue_message_id,
            message_id,
            queued_at,
            inflight_at,
        }
    }
}

/// Message content, deduplicated across regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MessageBody {
    pub data: Vec<u8>,
    pub content_type: String,
}

impl MessageBody {
    pub fn new(data: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
        }
    }
}

/// A leased message handed to a consumer. The embedded token names the
/// region that holds the lease, which is where the ack must be routed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveredMessage {
    pub message_id: Uuid,
    pub content_type: String,
    pub body: Vec<u8>,
    pub ack_token: AckToken,
}

/// Opaque-ish receipt for acking a leased message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckToken {
    pub region: String,
    pub queue_message_id: Uuid,
}

impl AckToken {
    pub fn new(region: impl Into<String>, queue_message_id: Uuid) -> Self {
        Self {
            region: region.into(),
            queue_message_id,
        }
    }
}

impl fmt::Display for AckToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.region, self.queue_message_id)
    }
}

impl FromStr for AckToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (region, id) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::invalid_parameter("malformed ack token"))?;
        let queue_message_id = Uuid::parse_str(id)
            .map_err(|_| Error::invalid_parameter("malformed queue message id"))?;
        Ok(Self {
            region: region.to_owned(),
            queue_message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uuids;

    #[test]
    fn ack_token_round_trips_through_display() {
        let token = AckToken::new("us-east", uuids::time_uuid());
        let parsed: AckToken = token.to_string().parse().unwrap();
        assert_eq!(token, parsed);
    }

    #[test]
    fn ack_token_rejects_garbage() {
        assert!("no-separator".parse::<AckToken>().is_err());
        assert!("region:not-a-uuid".parse::<AckToken>().is_err());
    }
}
