//! Local broker engine
//!
//! An embedded, sled-backed broker that implements [`BrokerDirectory`] and
//! [`BrokerClient`], so every command can run without a remote service.
//!
//! Layout inside the sled database:
//! - `topics`: topic name -> JSON [`Topic`] (its subscriptions)
//! - one tree per subscription queue, named after the entity path (see
//!   [`queue_tree_name`]); keys are big-endian sequence numbers so iteration
//!   yields messages in enqueue order, values are JSON [`ReceivedMessage`].
//!
//! Peek-lock receives stamp a lock token and `locked_until` on the stored
//! message and skip messages whose lock is still live. Receive-and-delete
//! removes the entry. Both use compare-and-swap so two receivers never get
//! the same message.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sled::{Db, IVec, Tree};
use tracing::{debug, info};
use uuid::Uuid;

use crate::broker::client::{
    BrokerClient, BrokerDirectory, MessageBatch, MessageReceiver, MessageSender,
    SubscriptionStats,
};
use crate::broker::message::{ReceiveMode, ReceivedMessage, SubQueue};
use crate::broker::topic::{Topic, queue_tree_name};
use crate::config::BrokerSettings;
use crate::utils::{Error, Result};

const TOPICS_TREE: &str = "topics";

#[derive(Clone)]
pub struct LocalBroker {
    db: Db,
    topics: Tree,
    lock_duration: Duration,
    max_batch_bytes: usize,
}

impl LocalBroker {
    /// Open or create a broker store at `path`.
    pub fn open(path: impl AsRef<Path>, settings: &BrokerSettings) -> Result<Self> {
        let db = sled::open(path)?;
        Self::with_db(db, settings)
    }

    /// A broker whose store is deleted when the last handle is dropped.
    pub fn temporary(settings: &BrokerSettings) -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(db, settings)
    }

    fn with_db(db: Db, settings: &BrokerSettings) -> Result<Self> {
        let topics = db.open_tree(TOPICS_TREE)?;
        Ok(Self {
            db,
            topics,
            lock_duration: Duration::seconds(settings.lock_duration_secs as i64),
            max_batch_bytes: settings.max_batch_bytes,
        })
    }

    /// Registers `topic` and `subscription`, creating either as needed.
    /// Returns `false` if the subscription already existed.
    pub fn create_subscription(&self, topic: &str, subscription: &str) -> Result<bool> {
        let mut entry = self.load_topic(topic)?.unwrap_or_else(|| Topic::new(topic));
        let created = entry.subscribe(subscription);

        self.topics
            .insert(topic.as_bytes(), serde_json::to_vec(&entry)?)?;
        self.db
            .open_tree(queue_tree_name(topic, subscription, SubQueue::Main))?;
        self.db
            .open_tree(queue_tree_name(topic, subscription, SubQueue::DeadLetter))?;
        self.db.flush()?;

        if created {
            info!(topic, subscription, "subscription created");
        }
        Ok(created)
    }

    /// Moves up to `max` unlocked active messages into the dead-letter
    /// sub-queue, the way a consumer rejecting them would. Each message is
    /// stamped with `reason`, `description` and the queue it came from.
    pub fn dead_letter(
        &self,
        topic: &str,
        subscription: &str,
        max: usize,
        reason: &str,
        description: Option<&str>,
    ) -> Result<u64> {
        let active = self.queue(topic, subscription, SubQueue::Main)?;
        let dead_letters = self.queue(topic, subscription, SubQueue::DeadLetter)?;
        let source = queue_tree_name(topic, subscription, SubQueue::Main);
        let now = Utc::now();
        let mut moved = 0u64;

        for entry in active.iter() {
            if moved as usize >= max {
                break;
            }
            let (key, raw) = entry?;
            let mut message = decode_stored(&active, &raw)?;
            if message.is_locked_at(now) {
                continue;
            }
            if active
                .compare_and_swap(&key, Some(&raw), None::<&[u8]>)?
                .is_err()
            {
                continue;
            }

            message.lock_token = None;
            message.locked_until = None;
            message.dead_letter_reason = Some(reason.to_string());
            message.dead_letter_error_description = description.map(str::to_string);
            message.dead_letter_source = Some(source.clone());
            dead_letters.insert(key, serde_json::to_vec(&message)?)?;
            moved += 1;
        }

        debug!(topic, subscription, moved, "messages dead-lettered");
        Ok(moved)
    }

    fn load_topic(&self, topic: &str) -> Result<Option<Topic>> {
        match self.topics.get(topic.as_bytes())? {
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| corrupt(&self.topics, e)),
            None => Ok(None),
        }
    }

    fn require_topic(&self, topic: &str) -> Result<Topic> {
        self.load_topic(topic)?
            .ok_or_else(|| Error::not_found_topic(topic))
    }

    fn queue(&self, topic: &str, subscription: &str, sub_queue: SubQueue) -> Result<Tree> {
        if !self.require_topic(topic)?.has_subscription(subscription) {
            return Err(Error::not_found_subscription(topic, subscription));
        }
        Ok(self
            .db
            .open_tree(queue_tree_name(topic, subscription, sub_queue))?)
    }

    fn lock_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.lock_duration
    }
}

impl std::fmt::Debug for LocalBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBroker")
            .field("db", &"sled::Db")
            .field("lock_duration", &self.lock_duration)
            .field("max_batch_bytes", &self.max_batch_bytes)
            .finish()
    }
}

#[async_trait]
impl BrokerDirectory for LocalBroker {
    async fn list_topics(&self) -> Result<Vec<String>> {
        self.topics
            .iter()
            .keys()
            .map(|key| -> Result<String> { Ok(String::from_utf8_lossy(&key?).into_owned()) })
            .collect()
    }

    async fn list_subscriptions(&self, topic: &str) -> Result<Vec<String>> {
        Ok(self.require_topic(topic)?.subscriptions.into_iter().collect())
    }

    async fn get_stats(&self, topic: &str, subscription: &str) -> Result<SubscriptionStats> {
        let active = self.queue(topic, subscription, SubQueue::Main)?;
        let dead_letters = self.queue(topic, subscription, SubQueue::DeadLetter)?;
        Ok(SubscriptionStats {
            active: active.len() as u64,
            dead_letter: dead_letters.len() as u64,
        })
    }
}

#[async_trait]
impl BrokerClient for LocalBroker {
    async fn receiver(
        &self,
        topic: &str,
        subscription: &str,
        sub_queue: SubQueue,
        mode: ReceiveMode,
    ) -> Result<Box<dyn MessageReceiver>> {
        let queue = self.queue(topic, subscription, sub_queue)?;
        debug!(topic, subscription, mode = mode.label(), "receiver opened");
        Ok(Box::new(LocalReceiver {
            broker: self.clone(),
            queue,
            mode,
            closed: false,
        }))
    }

    async fn sender(&self, topic: &str) -> Result<Box<dyn MessageSender>> {
        self.require_topic(topic)?;
        Ok(Box::new(LocalSender {
            broker: self.clone(),
            topic: topic.to_string(),
            closed: false,
        }))
    }

    async fn resend_dead_letter(&self, topic: &str, subscription: &str) -> Result<u64> {
        let active = self.queue(topic, subscription, SubQueue::Main)?;
        let dead_letters = self.queue(topic, subscription, SubQueue::DeadLetter)?;
        let mut resent = 0u64;

        for entry in dead_letters.iter() {
            let (key, raw) = entry?;
            if dead_letters
                .compare_and_swap(&key, Some(&raw), None::<&[u8]>)?
                .is_err()
            {
                continue;
            }

            let mut message = decode_stored(&dead_letters, &raw)?;
            message.lock_token = None;
            message.locked_until = None;
            message.dead_letter_reason = None;
            message.dead_letter_error_description = None;
            message.dead_letter_source = None;
            active.insert(key, serde_json::to_vec(&message)?)?;
            resent += 1;
        }

        self.db.flush_async().await?;
        Ok(resent)
    }

    async fn clear_dead_letter(&self, topic: &str, subscription: &str) -> Result<u64> {
        let dead_letters = self.queue(topic, subscription, SubQueue::DeadLetter)?;
        let mut cleared = 0u64;

        for key in dead_letters.iter().keys() {
            if dead_letters.remove(key?)?.is_some() {
                cleared += 1;
            }
        }

        self.db.flush_async().await?;
        Ok(cleared)
    }
}

struct LocalReceiver {
    broker: LocalBroker,
    queue: Tree,
    mode: ReceiveMode,
    closed: bool,
}

#[async_trait]
impl MessageReceiver for LocalReceiver {
    async fn receive(&mut self, max: usize) -> Result<Vec<ReceivedMessage>> {
        if self.closed {
            return Err(Error::Connectivity("receiver is closed".into()));
        }

        let now = Utc::now();
        let mut received = Vec::new();

        for entry in self.queue.iter() {
            if received.len() >= max {
                break;
            }
            let (key, raw) = entry?;
            let mut message = decode_stored(&self.queue, &raw)?;
            if message.is_locked_at(now) {
                continue;
            }
            message.delivery_count += 1;

            let replacement: Option<IVec> = match self.mode {
                ReceiveMode::PeekLock => {
                    message.lock_token = Some(Uuid::new_v4());
                    message.locked_until = Some(self.broker.lock_expiry(now));
                    Some(serde_json::to_vec(&message)?.into())
                }
                ReceiveMode::ReceiveAndDelete => {
                    message.lock_token = None;
                    message.locked_until = None;
                    None
                }
            };

            // lost the race to another receiver
            if self
                .queue
                .compare_and_swap(&key, Some(&raw), replacement)?
                .is_err()
            {
                continue;
            }
            received.push(message);
        }

        Ok(received)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.broker.db.flush_async().await?;
        }
        Ok(())
    }
}

struct LocalSender {
    broker: LocalBroker,
    topic: String,
    closed: bool,
}

#[async_trait]
impl MessageSender for LocalSender {
    fn create_batch(&self) -> MessageBatch {
        MessageBatch::new(self.broker.max_batch_bytes)
    }

    async fn send_batch(&mut self, batch: MessageBatch) -> Result<()> {
        if self.closed {
            return Err(Error::Connectivity("sender is closed".into()));
        }

        let topic = self.broker.require_topic(&self.topic)?;
        let queues = topic
            .subscriptions
            .iter()
            .map(|subscription| {
                self.broker
                    .db
                    .open_tree(queue_tree_name(&topic.name, subscription, SubQueue::Main))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let count = batch.len();
        for message in batch.into_messages() {
            let sequence = self.broker.db.generate_id()?;
            let stored = ReceivedMessage {
                message_id: Uuid::new_v4().to_string(),
                body: message.body,
                correlation_id: message.correlation_id,
                subject: message.subject,
                application_properties: message.application_properties,
                sequence_number: Some(sequence as i64),
                enqueued_time: Some(Utc::now()),
                ..Default::default()
            };
            let encoded = serde_json::to_vec(&stored)?;
            for queue in &queues {
                queue.insert(sequence.to_be_bytes(), encoded.as_slice())?;
            }
        }

        self.broker.db.flush_async().await?;
        debug!(topic = %self.topic, count, "batch enqueued");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

fn decode_stored(tree: &Tree, raw: &[u8]) -> Result<ReceivedMessage> {
    serde_json::from_slice(raw).map_err(|e| corrupt(tree, e))
}

fn corrupt(tree: &Tree, e: serde_json::Error) -> Error {
    Error::Connectivity(format!(
        "corrupt entry in {}: {e}",
        String::from_utf8_lossy(&tree.name())
    ))
}
