//! Message definitions for the broker boundary
//!
//! - `ReceivedMessage`: what a receiver hands back, including every
//!   broker-assigned field (ids, lock token, sequence numbers, timestamps and
//!   dead-letter metadata).
//! - `SendableMessage`: the subset a producer may set. It has no identity
//!   until the broker accepts it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User-defined key/value properties carried alongside the body.
pub type ApplicationProperties = BTreeMap<String, serde_json::Value>;

/// Fixed per-message allowance for headers when sizing a batch.
const MESSAGE_OVERHEAD_BYTES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiveMode {
    /// The message stays in its queue, locked to the receiver, until it is
    /// settled or the lock expires.
    PeekLock,
    /// The message is removed from its queue when it is received.
    ReceiveAndDelete,
}

impl ReceiveMode {
    pub fn is_destructive(self) -> bool {
        matches!(self, ReceiveMode::ReceiveAndDelete)
    }

    pub fn label(self) -> &'static str {
        match self {
            ReceiveMode::PeekLock => "peek-lock",
            ReceiveMode::ReceiveAndDelete => "receive-and-delete (destructive)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubQueue {
    Main,
    DeadLetter,
}

/// Broker-assigned message state. Only the name is ever persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageState {
    Active,
    Deferred,
    Scheduled,
    #[serde(other)]
    Unknown,
}

impl MessageState {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => MessageState::Active,
            1 => MessageState::Deferred,
            2 => MessageState::Scheduled,
            _ => MessageState::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SendableMessage {
    pub body: Vec<u8>,
    pub subject: Option<String>,
    pub correlation_id: Option<String>,
    pub application_properties: Option<ApplicationProperties>,
}

impl SendableMessage {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    /// Approximate wire size used to keep batches under the broker limit.
    pub fn encoded_len(&self) -> usize {
        let properties = self
            .application_properties
            .as_ref()
            .and_then(|p| serde_json::to_vec(p).ok())
            .map_or(0, |bytes| bytes.len());

        MESSAGE_OVERHEAD_BYTES
            + self.body.len()
            + self.subject.as_ref().map_or(0, String::len)
            + self.correlation_id.as_ref().map_or(0, String::len)
            + properties
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub message_id: String,
    /// Only set for peek-lock receives.
    pub lock_token: Option<Uuid>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub correlation_id: Option<String>,
    pub subject: Option<String>,
    pub application_properties: Option<ApplicationProperties>,
    pub delivery_count: u32,
    pub sequence_number: Option<i64>,
    pub enqueued_sequence_number: Option<i64>,
    pub enqueued_time: Option<DateTime<Utc>>,
    pub scheduled_enqueue_time: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub time_to_live_ms: Option<u64>,
    pub session_id: Option<String>,
    pub partition_key: Option<String>,
    pub reply_to: Option<String>,
    pub reply_to_session_id: Option<String>,
    pub to: Option<String>,
    /// Raw state code as reported by the broker.
    pub state: i32,
    pub dead_letter_reason: Option<String>,
    pub dead_letter_error_description: Option<String>,
    pub dead_letter_source: Option<String>,
}

impl ReceivedMessage {
    pub fn state(&self) -> MessageState {
        MessageState::from_code(self.state)
    }

    pub(crate) fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}
