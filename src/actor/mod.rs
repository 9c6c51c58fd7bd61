//! Per-queue actor lanes.
//!
//! Every `(queue, region)` pair maps to one live actor: a task draining a
//! bounded mpsc channel, so all state-machine operations for that pair run
//! serially. Requests carry a oneshot reply channel; a full mailbox is
//! surfaced to the caller as `QUEUE_BUSY` rather than waiting.

use dashmap::DashMap;
use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::db;
use crate::db::message::MessageStore;
use crate::error::Error;
use crate::message::{AckToken, DeliveredMessage, QueueMessage};
use crate::queue::Queue;
use crate::service::Status;
use crate::shard::ShardType;
use crate::uuids;

pub mod helper;
pub mod reaper;

use helper::QueueActorHelper;

pub enum Command {
    /// Write an available pointer for a body that already exists.
    Send {
        message_id: Uuid,
        queue_message_id: Uuid,
        delay_ms: i64,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    /// Lease up to `count` messages and return them with bodies attached.
    Get {
        count: usize,
        reply: oneshot::Sender<Result<Vec<DeliveredMessage>, Error>>,
    },
    Ack {
        queue_message_id: Uuid,
        reply: oneshot::Sender<Result<Status, Error>>,
    },
    /// Reaper tick: sweep expired leases back to available.
    Tick,
}

struct QueueActor {
    queue: Queue,
    region: String,
    helper: QueueActorHelper,
    store: MessageStore,
    rx: mpsc::Receiver<Command>,
}

impl QueueActor {
    fn spawn(
        queue: Queue,
        region: String,
        helper: QueueActorHelper,
        store: MessageStore,
        mailbox_bound: usize,
    ) -> mpsc::Sender<Command> {
        let (tx, rx) = mpsc::channel(mailbox_bound);

        let actor = Self {
            queue,
            region,
            helper,
            store,
            rx,
        };
        tokio::spawn(actor.run());

        tx
    }

    async fn run(mut self) {
        tracing::debug!(queue = %self.queue.name, region = %self.region, "queue actor started");

        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Send {
                    message_id,
                    queue_message_id,
                    delay_ms,
                    reply,
                } => {
                    let result = self.send(message_id, queue_message_id, delay_ms).await;
                    let _ = reply.send(result);
                }
                Command::Get { count, reply } => {
                    let _ = reply.send(self.get(count).await);
                }
                Command::Ack {
                    queue_message_id,
                    reply,
                } => {
                    let result = self
                        .helper
                        .ack_queue_message(&self.queue.name, &self.region, &queue_message_id)
                        .await;
                    let _ = reply.send(result);
                }
                Command::Tick => {
                    if let Err(err) = self
                        .helper
                        .sweep_expired(&self.queue.name, &self.region)
                        .await
                    {
                        tracing::warn!(
                            queue = %self.queue.name,
                            region = %self.region,
                            "inflight sweep failed: {err}"
                        );
                    }
                }
            }
        }

        tracing::debug!(queue = %self.queue.name, region = %self.region, "queue actor stopped");
    }

    async fn send(
        &self,
        message_id: Uuid,
        queue_message_id: Uuid,
        delay_ms: i64,
    ) -> Result<(), Error> {
        let now = uuids::now_millis();
        let mut pointer = QueueMessage::new(
            self.queue.name.clone(),
            self.region.clone(),
            message_id,
            queue_message_id,
            now,
            now + delay_ms,
        );
        self.store
            .write_message(ShardType::Available, &mut pointer)
            .await?;

        Ok(())
    }

    async fn get(&self, count: usize) -> Result<Vec<DeliveredMessage>, Error> {
        let candidates = self
            .helper
            .next_available(&self.queue.name, &self.region, count)
            .await?;

        let mut delivered = Vec::with_capacity(candidates.len());
        for message in candidates {
            let leased = self
                .helper
                .put_inflight(&message, self.queue.inflight_timeout_ms)
                .await?;

            let Some(body) = self.store.load_message_data(&leased.message_id).await? else {
                // Pointer outlived its body (GC or a lost write); skip it.
                tracing::warn!(
                    queue = %self.queue.name,
                    message_id = %leased.message_id,
                    "leased pointer has no body"
                );
                continue;
            };

            delivered.push(DeliveredMessage {
                message_id: leased.message_id,
                content_type: body.content_type,
                body: body.data,
                ack_token: AckToken::new(self.region.clone(), leased.queue_message_id),
            });
        }

        Ok(delivered)
    }
}

/// Routes commands to the single live actor for each `(queue, region)`,
/// spawning lanes lazily.
pub struct ActorRouter {
    db: SqlitePool,
    store: MessageStore,
    helper: QueueActorHelper,
    mailbox_bound: usize,
    actors: DashMap<(String, String), mpsc::Sender<Command>>,
}

impl ActorRouter {
    pub fn new(
        db: SqlitePool,
        store: MessageStore,
        helper: QueueActorHelper,
        mailbox_bound: usize,
    ) -> Self {
        Self {
            db,
            store,
            helper,
            mailbox_bound,
            actors: DashMap::new(),
        }
    }

    /// Enqueue a command on the actor lane, spawning it if needed. A full
    /// mailbox fails fast with `QueueBusy`.
    pub async fn try_send(&self, queue_name: &str, region: &str, command: Command) -> Result<(), Error> {
        let tx = self.sender(queue_name, region).await?;
        tx.try_send(command).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => Error::QueueBusy {
                queue: queue_name.to_owned(),
            },
            mpsc::error::TrySendError::Closed(_) => {
                Error::internal(eyre::eyre!("actor lane for {queue_name}/{region} is gone"))
            }
        })
    }

    /// Stop routing for a deleted queue. Lanes wind down once their last
    /// sender is dropped.
    pub fn drop_queue(&self, queue_name: &str) {
        self.actors.retain(|(queue, _), _| queue != queue_name);
    }

    async fn sender(&self, queue_name: &str, region: &str) -> Result<mpsc::Sender<Command>, Error> {
        let key = (queue_name.to_owned(), region.to_owned());

        if let Some(tx) = self.actors.get(&key) {
            if !tx.is_closed() {
                return Ok(tx.clone());
            }
        }
        self.actors.remove_if(&key, |_, tx| tx.is_closed());

        let queue = db::queue::get(&self.db, queue_name)
            .await?
            .ok_or_else(|| Error::queue_not_found(queue_name))?;

        // Two concurrent spawns race benignly: the loser's lane has no
        // senders left and exits on its own.
        let tx = self
            .actors
            .entry(key)
            .or_insert_with(|| {
                QueueActor::spawn(
                    queue,
                    region.to_owned(),
                    self.helper.clone(),
                    self.store.clone(),
                    self.mailbox_bound,
                )
            })
            .clone();

        Ok(tx)
    }
}
