use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::broker::message::{ReceivedMessage, SendableMessage};
use crate::record::{BodyEncoding, PersistedRecord};
use crate::utils::{Error, Result};

/// Projects a received message onto its persisted form. Never fails.
pub fn to_record(message: &ReceivedMessage) -> PersistedRecord {
    let (body, body_encoding) = match std::str::from_utf8(&message.body) {
        Ok(text) => (text.to_string(), None),
        Err(_) => (STANDARD.encode(&message.body), Some(BodyEncoding::Base64)),
    };

    PersistedRecord {
        message_id: Some(message.message_id.clone()),
        lock_token: message.lock_token,
        body,
        body_encoding,
        content_type: message.content_type.clone(),
        correlation_id: message.correlation_id.clone(),
        subject: message.subject.clone(),
        application_properties: message.application_properties.clone(),
        delivery_count: message.delivery_count,
        sequence_number: message.sequence_number,
        enqueued_sequence_number: message.enqueued_sequence_number,
        enqueued_time: message.enqueued_time,
        scheduled_enqueue_time: message.scheduled_enqueue_time,
        expires_at: message.expires_at,
        locked_until: message.locked_until,
        time_to_live: message.time_to_live_ms.map(millis_to_nanos),
        session_id: message.session_id.clone(),
        partition_key: message.partition_key.clone(),
        reply_to: message.reply_to.clone(),
        reply_to_session_id: message.reply_to_session_id.clone(),
        to: message.to.clone(),
        state: message.state(),
        dead_letter_reason: message.dead_letter_reason.clone(),
        dead_letter_error_description: message.dead_letter_error_description.clone(),
        dead_letter_source: message.dead_letter_source.clone(),
    }
}

/// Builds the outbound message for a persisted record.
///
/// Only producer-settable fields are carried over. Empty subject and
/// correlation id strings are treated as absent. Fails only when a base64
/// body does not decode.
pub fn to_sendable(record: &PersistedRecord) -> Result<SendableMessage> {
    let body = match record.body_encoding {
        None => record.body.clone().into_bytes(),
        Some(BodyEncoding::Base64) => STANDARD
            .decode(&record.body)
            .map_err(|e| Error::decode(None, e))?,
    };

    Ok(SendableMessage {
        body,
        subject: non_empty(&record.subject),
        correlation_id: non_empty(&record.correlation_id),
        application_properties: record.application_properties.clone(),
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

fn millis_to_nanos(ms: u64) -> i64 {
    i64::try_from(ms.saturating_mul(1_000_000)).unwrap_or(i64::MAX)
}
