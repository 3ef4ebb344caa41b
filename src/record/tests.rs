use super::{BodyEncoding, LegacyRecord, PersistedRecord, to_record, to_sendable};
use crate::broker::message::{ApplicationProperties, MessageState, ReceivedMessage};
use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

fn fully_populated() -> ReceivedMessage {
    let mut properties = ApplicationProperties::new();
    properties.insert("tenant".into(), json!("acme"));
    properties.insert("attempt".into(), json!(3));
    properties.insert("flags".into(), json!({"replay": true}));

    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    ReceivedMessage {
        message_id: "msg-1".into(),
        lock_token: Some(Uuid::new_v4()),
        body: br#"{"order":42}"#.to_vec(),
        content_type: Some("application/json".into()),
        correlation_id: Some("corr-9".into()),
        subject: Some("order.created".into()),
        application_properties: Some(properties),
        delivery_count: 10,
        sequence_number: Some(17),
        enqueued_sequence_number: Some(16),
        enqueued_time: Some(at),
        scheduled_enqueue_time: Some(at),
        expires_at: Some(at),
        locked_until: Some(at),
        time_to_live_ms: Some(60_000),
        session_id: Some("s-1".into()),
        partition_key: Some("p-1".into()),
        reply_to: Some("replies".into()),
        reply_to_session_id: Some("s-2".into()),
        to: Some("orders".into()),
        state: 1,
        dead_letter_reason: Some("MaxDeliveryCountExceeded".into()),
        dead_letter_error_description: Some("gave up".into()),
        dead_letter_source: Some("orders/billing".into()),
    }
}

#[test]
fn test_round_trip_preserves_replayable_fields() {
    let message = fully_populated();
    let sendable = to_sendable(&to_record(&message)).unwrap();

    assert_eq!(sendable.body, message.body);
    assert_eq!(sendable.subject, message.subject);
    assert_eq!(sendable.correlation_id, message.correlation_id);
    assert_eq!(sendable.application_properties, message.application_properties);
}

#[test]
fn test_round_trip_survives_the_json_line() {
    let message = fully_populated();
    let line = serde_json::to_string(&to_record(&message)).unwrap();
    let parsed: PersistedRecord = serde_json::from_str(&line).unwrap();

    assert_eq!(parsed, to_record(&message));
    assert_eq!(to_sendable(&parsed).unwrap().body, message.body);
}

#[test]
fn test_record_keeps_broker_fields_for_audit() {
    let message = fully_populated();
    let record = to_record(&message);

    assert_eq!(record.message_id.as_deref(), Some("msg-1"));
    assert_eq!(record.lock_token, message.lock_token);
    assert_eq!(record.delivery_count, 10);
    assert_eq!(record.sequence_number, Some(17));
    assert_eq!(record.state, MessageState::Deferred);
    assert_eq!(record.dead_letter_source.as_deref(), Some("orders/billing"));
}

#[test]
fn test_absent_fields_are_written_as_null() {
    let message = ReceivedMessage {
        message_id: "msg-2".into(),
        body: b"plain".to_vec(),
        ..Default::default()
    };
    let value = serde_json::to_value(to_record(&message)).unwrap();

    assert_eq!(value["messageID"], "msg-2");
    assert_eq!(value["body"], "plain");
    assert!(value["subject"].is_null());
    assert!(value["correlationID"].is_null());
    assert!(value["sequenceNumber"].is_null());
    assert!(value["lockToken"].is_null());
    assert!(value["applicationProperties"].is_null());
    assert_eq!(value["deliveryCount"], 0);
    assert_eq!(value["state"], "Active");
    // only written for binary bodies
    assert!(value.get("bodyEncoding").is_none());
}

#[test]
fn test_unknown_state_codes_are_named_unknown() {
    let message = ReceivedMessage {
        state: 99,
        ..Default::default()
    };
    let value = serde_json::to_value(to_record(&message)).unwrap();
    assert_eq!(value["state"], "Unknown");
}

#[test]
fn test_unrecognised_state_names_decode_as_unknown() {
    let line = r#"{"body":"x","state":"Archived"}"#;
    let record: PersistedRecord = serde_json::from_str(line).unwrap();
    assert_eq!(record.state, MessageState::Unknown);
}

#[test]
fn test_binary_bodies_use_base64() {
    let message = ReceivedMessage {
        body: vec![0xff, 0x00, 0xfe],
        ..Default::default()
    };
    let record = to_record(&message);

    assert_eq!(record.body_encoding, Some(BodyEncoding::Base64));
    assert_eq!(record.body, "/wD+");
    assert_eq!(to_sendable(&record).unwrap().body, vec![0xff, 0x00, 0xfe]);
}

#[test]
fn test_bad_base64_is_a_decode_error() {
    let mut record = to_record(&ReceivedMessage::default());
    record.body = "not base64!".into();
    record.body_encoding = Some(BodyEncoding::Base64);

    assert!(matches!(
        to_sendable(&record),
        Err(crate::utils::Error::Decode { line: None, .. })
    ));
}

#[test]
fn test_empty_subject_and_correlation_are_omitted() {
    let mut record = to_record(&fully_populated());
    record.subject = Some(String::new());
    record.correlation_id = Some(String::new());
    record.application_properties = None;

    let sendable = to_sendable(&record).unwrap();
    assert_eq!(sendable.subject, None);
    assert_eq!(sendable.correlation_id, None);
    assert_eq!(sendable.application_properties, None);
}

#[test]
fn test_legacy_records_convert_with_broker_fields_absent() {
    let legacy: LegacyRecord = serde_json::from_value(json!({
        "body": "hello",
        "subject": "greeting",
        "applicationProperties": {"lang": "en"}
    }))
    .unwrap();
    let record = PersistedRecord::from(legacy);

    assert_eq!(record.message_id, None);
    assert_eq!(record.sequence_number, None);
    let sendable = to_sendable(&record).unwrap();
    assert_eq!(sendable.body, b"hello");
    assert_eq!(sendable.subject.as_deref(), Some("greeting"));
    assert_eq!(sendable.correlation_id, None);
}

fn capture_line(lock_token: &str) -> String {
    format!(
        concat!(
            r#"{{"applicationProperties":{{"tenant":"acme"}},"body":"{{\"order\":42}}","#,
            r#""contentType":null,"correlationID":"corr-9","deadLetterErrorDescription":null,"#,
            r#""deadLetterReason":"MaxDeliveryCountExceeded","deadLetterSource":null,"#,
            r#""deliveryCount":10,"enqueuedSequenceNumber":null,"#,
            r#""enqueuedTime":"2024-05-01T12:00:00.123456789Z","expiresAt":null,"#,
            r#""lockedUntil":"2024-05-01T12:01:00+00:00","lockToken":{},"#,
            r#""messageID":"msg-1","partitionKey":null,"replyTo":null,"replyToSessionID":null,"#,
            r#""scheduledEnqueueTime":null,"sequenceNumber":17,"sessionID":null,"#,
            r#""state":"Active","subject":"order.created","timeToLive":60000000000,"to":null}}"#,
        ),
        lock_token
    )
}

#[test]
fn test_byte_array_lock_tokens_decode() {
    let zero = format!("[{}]", vec!["0"; 16].join(","));
    let record: PersistedRecord = serde_json::from_str(&capture_line(&zero)).unwrap();
    assert_eq!(record.lock_token, None);
    assert_eq!(record.time_to_live, Some(60_000_000_000));
    assert_eq!(record.state, MessageState::Active);

    let sendable = to_sendable(&record).unwrap();
    assert_eq!(sendable.body, br#"{"order":42}"#);
    assert_eq!(sendable.subject.as_deref(), Some("order.created"));
    assert_eq!(sendable.correlation_id.as_deref(), Some("corr-9"));

    let bytes: Vec<String> = (1..=16).map(|b| b.to_string()).collect();
    let line = capture_line(&format!("[{}]", bytes.join(",")));
    let record: PersistedRecord = serde_json::from_str(&line).unwrap();
    let expected: Vec<u8> = (1..=16).collect();
    assert_eq!(record.lock_token.unwrap().as_bytes().as_slice(), expected.as_slice());
}

#[test]
fn test_string_lock_tokens_decode() {
    let token = Uuid::new_v4();
    let record: PersistedRecord =
        serde_json::from_str(&capture_line(&format!("\"{token}\""))).unwrap();
    assert_eq!(record.lock_token, Some(token));

    let record: PersistedRecord = serde_json::from_str(&capture_line("null")).unwrap();
    assert_eq!(record.lock_token, None);

    assert!(serde_json::from_str::<PersistedRecord>(&capture_line("\"not-a-uuid\"")).is_err());
}

#[test]
fn test_time_to_live_is_written_in_nanoseconds() {
    let value = serde_json::to_value(to_record(&fully_populated())).unwrap();
    assert_eq!(value["timeToLive"], 60_000_000_000i64);
    assert!(value.get("timeToLiveMs").is_none());
}
