//! Inflight timeout reaper.
//!
//! A periodic tick per queue, delivered through the actor lane so that the
//! sweep serializes with sends, gets and acks for that queue. The interval
//! must stay at or below half the smallest configured inflight timeout.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;

use super::{ActorRouter, Command};
use crate::db;

pub fn spawn(
    db: SqlitePool,
    router: Arc<ActorRouter>,
    region: String,
    interval_ms: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let queues = match db::queue::list(&db).await {
                Ok(queues) => queues,
                Err(err) => {
                    tracing::warn!("reaper could not list queues: {err}");
                    continue;
                }
            };

            for queue in queues {
                if !queue.regions().iter().any(|r| r == &region) {
                    continue;
                }
                // A busy or vanished lane just means this queue waits for
                // the next tick.
                if let Err(err) = router.try_send(&queue.name, &region, Command::Tick).await {
                    tracing::debug!(queue = %queue.name, "reaper tick skipped: {err}");
                }
            }
        }
    })
}
