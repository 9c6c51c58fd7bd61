//! Cluster-facing façade over the queue substrate.
//!
//! Owns the storage pool, the actor router and the background tasks
//! (counter flush, inflight reaper, body GC). Send writes the body once and
//! fans a pointer out to every replica region through that region's actor
//! lane; get and ack run against the local region unless an ack token says
//! otherwise.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::actor::helper::QueueActorHelper;
use crate::actor::{reaper, ActorRouter, Command};
use crate::audit::{AuditAction, AuditLog, AuditStatus};
use crate::config::Config;
use crate::counter::ShardCounters;
use crate::db;
use crate::db::message::MessageStore;
use crate::error::Error;
use crate::message::{AckToken, DeliveredMessage, MessageBody};
use crate::queue::{Queue, QueueRequest, QueueStatistics};
use crate::strategy::ShardStrategy;
use crate::uuids;

/// Service-level response taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    BadRequest,
    NotFound,
    QueueBusy,
    Timeout,
    InternalError,
}

#[derive(Clone)]
pub struct Service {
    db: SqlitePool,
    config: Arc<Config>,
    counters: Arc<ShardCounters>,
    store: MessageStore,
    router: Arc<ActorRouter>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Service {
    pub async fn connect() -> Result<Self, Error> {
        Self::connect_with(Config::default()).await
    }

    pub async fn connect_with(config: Config) -> Result<Self, Error> {
        let db = db::connect(config.db_path()).await?;

        let counters = Arc::new(ShardCounters::new(
            db.clone(),
            config.counter_flush_threshold(),
        ));
        let strategy = Arc::new(ShardStrategy::new(
            db.clone(),
            counters.clone(),
            config.shard_max_size(),
        ));
        let store = MessageStore::new(db.clone(), strategy, counters.clone());
        let helper = QueueActorHelper::new(db.clone(), store.clone());
        let router = Arc::new(ActorRouter::new(
            db.clone(),
            store.clone(),
            helper,
            config.mailbox_bound(),
        ));

        let tasks = vec![
            reaper::spawn(
                db.clone(),
                router.clone(),
                config.region_local().to_owned(),
                config.reaper_interval_ms(),
            ),
            spawn_counter_flush(counters.clone(), config.counter_flush_interval_ms()),
            spawn_body_gc(
                store.clone(),
                config.gc_interval_ms(),
                config.max_retention_ms(),
            ),
        ];

        tracing::info!(region = config.region_local(), "queue service connected");

        Ok(Self {
            db,
            config: Arc::new(config),
            counters,
            store,
            router,
            tasks: Arc::new(Mutex::new(tasks)),
        })
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register a queue. Duplicate creation is accepted and returns the
    /// existing definition unchanged.
    pub async fn create_queue(&self, request: QueueRequest) -> Result<Queue, Error> {
        if request.name.is_empty() {
            return Err(Error::invalid_parameter("queue name must not be empty"));
        }

        let regions = match request.regions {
            Some(regions) if !regions.is_empty() => regions,
            Some(_) => {
                return Err(Error::invalid_parameter(
                    "queue must replicate to at least one region",
                ))
            }
            None => self.config.regions_replicated(),
        };

        let queue = Queue {
            name: request.name,
            default_region: regions[0].clone(),
            regions: sqlx::types::Json(regions),
            inflight_timeout_ms: request
                .inflight_timeout_ms
                .unwrap_or(self.config.inflight_timeout_ms()) as i64,
            delivery_delay_ms: request
                .delivery_delay_ms
                .unwrap_or(self.config.delivery_delay_ms()) as i64,
            created_at: uuids::now_millis(),
        };

        if db::queue::insert(&self.db, &queue).await? {
            tracing::info!(queue = %queue.name, "queue created");
            Ok(queue)
        } else {
            Ok(db::queue::get(&self.db, &queue.name)
                .await?
                .ok_or_else(|| Error::queue_not_found(&queue.name))?)
        }
    }

    /// Drop a queue with its shards, counters and pending pointers in every
    /// region. Bodies are reclaimed by the GC; audit history stays.
    pub async fn delete_queue(&self, name: &str) -> Result<(), Error> {
        db::queue::delete(&self.db, name).await?;
        self.router.drop_queue(name);

        tracing::info!(queue = name, "queue deleted");

        Ok(())
    }

    pub async fn list_queues(&self) -> Result<Vec<Queue>, Error> {
        db::queue::list(&self.db).await
    }

    /// Pointer counts for the local region.
    pub async fn queue_statistics(&self, name: &str) -> Result<QueueStatistics, Error> {
        db::queue::statistics(&self.db, name, self.config.region_local()).await
    }

    /// Store the body once, then fan an available pointer out to each of the
    /// queue's regions. The returned id addresses the body everywhere.
    pub async fn send_message(
        &self,
        queue_name: &str,
        content_type: &str,
        body: impl Into<Vec<u8>>,
        delivery_delay_ms: Option<u64>,
    ) -> Result<Uuid, Error> {
        let queue = db::queue::get(&self.db, queue_name)
            .await?
            .ok_or_else(|| Error::queue_not_found(queue_name))?;

        let message_id = uuids::time_uuid();
        self.store
            .write_message_data(&message_id, &MessageBody::new(body.into(), content_type))
            .await?;

        let delay_ms = delivery_delay_ms.map(|ms| ms as i64).unwrap_or(queue.delivery_delay_ms);

        for region in queue.regions() {
            self.ask(queue_name, region, |reply| Command::Send {
                message_id,
                queue_message_id: message_id,
                delay_ms,
                reply,
            })
            .await?;
        }

        if let Err(err) = db::audit::record(
            &self.db,
            &message_id,
            &message_id,
            queue_name,
            AuditAction::Send,
            AuditStatus::Success,
            None,
        )
        .await
        {
            tracing::warn!(message_id = %message_id, "audit append failed: {err}");
        }

        Ok(message_id)
    }

    /// Lease up to `count` messages from the local region.
    pub async fn get_next_messages(
        &self,
        queue_name: &str,
        count: usize,
    ) -> Result<Vec<DeliveredMessage>, Error> {
        self.ask(queue_name, self.config.region_local(), |reply| Command::Get {
            count,
            reply,
        })
        .await
    }

    /// Acknowledge a leased message, routed to the region that holds the
    /// lease (named by the token). Always answers in the response taxonomy;
    /// failures along the way collapse to their status.
    pub async fn ack_message(&self, queue_name: &str, token: &AckToken) -> Status {
        let result = self
            .ask(queue_name, &token.region, |reply| Command::Ack {
                queue_message_id: token.queue_message_id,
                reply,
            })
            .await;

        match result {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(queue = queue_name, "ack failed: {err}");
                err.status()
            }
        }
    }

    /// Full history for one message, oldest first.
    pub async fn get_audit_logs(&self, message_id: &Uuid) -> Result<Vec<AuditLog>, Error> {
        db::audit::get_audit_logs(&self.db, message_id).await
    }

    /// Flush pending counters and stop the background tasks. Actor lanes
    /// wind down once the service (and its routed senders) drop.
    pub async fn shutdown(&self) {
        self.counters.flush().await;

        let tasks = {
            let mut guard = self.tasks.lock().expect("task list poisoned");
            std::mem::take(&mut *guard)
        };
        for task in tasks {
            task.abort();
        }

        tracing::info!("queue service shut down");
    }

    /// Route one command and await its reply under the request deadline.
    /// Storage writes already issued are not rolled back on expiry.
    async fn ask<T>(
        &self,
        queue_name: &str,
        region: &str,
        command: impl FnOnce(oneshot::Sender<Result<T, Error>>) -> Command,
    ) -> Result<T, Error> {
        let (reply, rx) = oneshot::channel();
        self.router
            .try_send(queue_name, region, command(reply))
            .await?;

        let deadline = Duration::from_millis(self.config.request_timeout_ms());
        match tokio::time::timeout(deadline, rx).await {
            Err(_) => Err(Error::Timeout),
            Ok(Err(_)) => Err(Error::internal(eyre::eyre!(
                "actor for {queue_name}/{region} dropped the reply"
            ))),
            Ok(Ok(result)) => result,
        }
    }
}

fn spawn_counter_flush(counters: Arc<ShardCounters>, interval_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            counters.flush().await;
        }
    })
}

/// Best-effort removal of bodies past retention that no pointer references.
fn spawn_body_gc(store: MessageStore, interval_ms: u64, retention_ms: u64) -> JoinHandle<()> {
    const GC_PAGE: i64 = 100;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let cutoff = uuids::now_millis() - retention_ms as i64;
            let mut after = None;

            loop {
                let ids = match store.list_message_data_ids(after, GC_PAGE).await {
                    Ok(ids) => ids,
                    Err(err) => {
                        tracing::warn!("body gc scan failed: {err}");
                        break;
                    }
                };
                let Some(last) = ids.last() else {
                    break;
                };
                after = Some(*last);

                for id in &ids {
                    if uuids::unix_millis(id) > cutoff {
                        continue;
                    }
                    match store.body_referenced(id).await {
                        Ok(true) => {}
                        Ok(false) => {
                            if let Err(err) = store.delete_message_data(id).await {
                                tracing::warn!(message_id = %id, "body gc delete failed: {err}");
                            }
                        }
                        Err(err) => {
                            tracing::warn!(message_id = %id, "body gc reference check failed: {err}");
                        }
                    }
                }

                if (ids.len() as i64) < GC_PAGE {
                    break;
                }
                tokio::task::yield_now().await;
            }
        }
    })
}
