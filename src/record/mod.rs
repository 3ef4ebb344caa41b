//! The `record` module is the on-disk projection of broker messages.
//!
//! `PersistedRecord` is what a drain writes, one JSON object per line, and
//! what a publish reads back. `codec` converts in both directions.

pub mod codec;
mod lock_token;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broker::message::{ApplicationProperties, MessageState};

pub use codec::{to_record, to_sendable};

/// How `body` is encoded in the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    Base64,
}

/// A drained message as persisted.
///
/// Field names are part of the file format and must stay stable. Absent
/// broker fields are written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    #[serde(rename = "messageID")]
    pub message_id: Option<String>,
    /// Written as a UUID string; captures that stored the raw 16 bytes are
    /// accepted too. An all-zero token reads as absent.
    #[serde(default, deserialize_with = "lock_token::deserialize")]
    pub lock_token: Option<Uuid>,
    /// UTF-8 text, or base64 when `body_encoding` says so.
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_encoding: Option<BodyEncoding>,
    pub content_type: Option<String>,
    #[serde(rename = "correlationID")]
    pub correlation_id: Option<String>,
    pub subject: Option<String>,
    pub application_properties: Option<ApplicationProperties>,
    #[serde(default)]
    pub delivery_count: u32,
    pub sequence_number: Option<i64>,
    pub enqueued_sequence_number: Option<i64>,
    pub enqueued_time: Option<DateTime<Utc>>,
    pub scheduled_enqueue_time: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    /// Nanoseconds.
    #[serde(rename = "timeToLive")]
    pub time_to_live: Option<i64>,
    #[serde(rename = "sessionID")]
    pub session_id: Option<String>,
    pub partition_key: Option<String>,
    pub reply_to: Option<String>,
    #[serde(rename = "replyToSessionID")]
    pub reply_to_session_id: Option<String>,
    pub to: Option<String>,
    #[serde(default = "unknown_state")]
    pub state: MessageState,
    pub dead_letter_reason: Option<String>,
    pub dead_letter_error_description: Option<String>,
    pub dead_letter_source: Option<String>,
}

fn unknown_state() -> MessageState {
    MessageState::Unknown
}

/// The simplified shape stored by JSON-array captures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRecord {
    pub body: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default, rename = "correlationID")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub application_properties: Option<ApplicationProperties>,
}

impl From<LegacyRecord> for PersistedRecord {
    fn from(legacy: LegacyRecord) -> Self {
        Self {
            message_id: None,
            lock_token: None,
            body: legacy.body,
            body_encoding: None,
            content_type: None,
            correlation_id: legacy.correlation_id,
            subject: legacy.subject,
            application_properties: legacy.application_properties,
            delivery_count: 0,
            sequence_number: None,
            enqueued_sequence_number: None,
            enqueued_time: None,
            scheduled_enqueue_time: None,
            expires_at: None,
            locked_until: None,
            time_to_live: None,
            session_id: None,
            partition_key: None,
            reply_to: None,
            reply_to_session_id: None,
            to: None,
            state: MessageState::Unknown,
            dead_letter_reason: None,
            dead_letter_error_description: None,
            dead_letter_source: None,
        }
    }
}

#[cfg(test)]
mod tests;
