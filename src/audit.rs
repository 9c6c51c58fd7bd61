//! Audit log models.
//!
//! Every terminal action on a message pointer appends one history row. The
//! log is append-only: a pointer that goes around the lease cycle more than
//! once keeps one row per action, in order.

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Send,
    Get,
    Ack,
    Nack,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    /// Append order, monotonic per store.
    pub seq: i64,
    pub message_id: Uuid,
    pub queue_message_id: Uuid,
    pub queue_name: String,
    pub action: AuditAction,
    pub status: AuditStatus,
    pub error: Option<String>,
    /// Server timestamp, ms epoch.
    pub recorded_at: i64,
}
