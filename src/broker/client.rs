//! Broker client boundary
//!
//! The pipelines only ever talk to a broker through these traits:
//! - [`BrokerDirectory`]: administrative listing and runtime statistics.
//! - [`BrokerClient`]: receivers, senders and the broker-native dead-letter
//!   resend/clear operations.
//!
//! Receivers and senders are handles a pipeline owns for the duration of one
//! invocation. Callers must `close` them on every exit path.

use async_trait::async_trait;

use crate::broker::message::{ReceiveMode, ReceivedMessage, SendableMessage, SubQueue};
use crate::utils::Result;

/// Point-in-time message counts for one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriptionStats {
    pub active: u64,
    pub dead_letter: u64,
}

#[async_trait]
pub trait BrokerDirectory: Send + Sync {
    async fn list_topics(&self) -> Result<Vec<String>>;

    async fn list_subscriptions(&self, topic: &str) -> Result<Vec<String>>;

    async fn get_stats(&self, topic: &str, subscription: &str) -> Result<SubscriptionStats>;
}

#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn receiver(
        &self,
        topic: &str,
        subscription: &str,
        sub_queue: SubQueue,
        mode: ReceiveMode,
    ) -> Result<Box<dyn MessageReceiver>>;

    async fn sender(&self, topic: &str) -> Result<Box<dyn MessageSender>>;

    /// Moves every dead-lettered message back onto the subscription's main
    /// queue. Returns the number of messages moved.
    async fn resend_dead_letter(&self, topic: &str, subscription: &str) -> Result<u64>;

    /// Permanently deletes every dead-lettered message. Returns the number
    /// of messages deleted.
    async fn clear_dead_letter(&self, topic: &str, subscription: &str) -> Result<u64>;
}

#[async_trait]
pub trait MessageReceiver: Send {
    /// Receives up to `max` messages. An empty result means the queue had
    /// nothing to hand out.
    async fn receive(&mut self, max: usize) -> Result<Vec<ReceivedMessage>>;

    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait MessageSender: Send {
    /// Starts an empty batch bounded by the broker's payload limit.
    fn create_batch(&self) -> MessageBatch;

    async fn send_batch(&mut self, batch: MessageBatch) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Why a message was not added to a [`MessageBatch`].
#[derive(Debug)]
pub enum AddError {
    /// The batch already holds messages and this one would overflow it.
    /// The message is handed back so it can go into the next batch.
    Full(SendableMessage),
    /// The message does not fit even into an empty batch.
    TooLarge { size: usize, max: usize },
}

/// An ordered accumulation of messages bounded by total encoded size.
#[derive(Debug)]
pub struct MessageBatch {
    max_bytes: usize,
    size_bytes: usize,
    messages: Vec<SendableMessage>,
}

impl MessageBatch {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            size_bytes: 0,
            messages: Vec::new(),
        }
    }

    pub fn try_add(&mut self, message: SendableMessage) -> Result<(), AddError> {
        let size = message.encoded_len();
        if self.size_bytes + size <= self.max_bytes {
            self.size_bytes += size;
            self.messages.push(message);
            return Ok(());
        }

        if self.messages.is_empty() {
            Err(AddError::TooLarge {
                size,
                max: self.max_bytes,
            })
        } else {
            Err(AddError::Full(message))
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn messages(&self) -> &[SendableMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<SendableMessage> {
        self.messages
    }
}
