use super::{
    RecordReader, RecordWriter, default_drain_file_name, latest_drain_file, list_candidate_files,
};
use crate::broker::message::ReceivedMessage;
use crate::record::{PersistedRecord, to_record};
use crate::utils::Error;

use chrono::{TimeZone, Utc};
use std::fs;
use tempfile::tempdir;

fn record(body: &str) -> PersistedRecord {
    to_record(&ReceivedMessage {
        message_id: format!("id-{body}"),
        body: body.as_bytes().to_vec(),
        ..Default::default()
    })
}

async fn read_all(path: &std::path::Path) -> (Vec<PersistedRecord>, Option<Error>) {
    let mut reader = RecordReader::open(path).await.unwrap();
    let mut records = Vec::new();
    loop {
        match reader.next_record().await {
            Ok(Some(record)) => records.push(record),
            Ok(None) => return (records, None),
            Err(e) => {
                // the sequence is over after an error
                assert!(reader.next_record().await.unwrap().is_none());
                return (records, Some(e));
            }
        }
    }
}

#[tokio::test]
async fn test_append_then_read_back_in_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.jsonl");

    let mut writer = RecordWriter::create(&path).await.unwrap();
    for body in ["one", "two", "three"] {
        writer.append(&record(body)).await.unwrap();
    }
    assert_eq!(writer.written(), 3);
    assert_eq!(writer.finish().await.unwrap(), 3);

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 3);

    let (records, err) = read_all(&path).await;
    assert!(err.is_none());
    let bodies: Vec<_> = records.iter().map(|r| r.body.as_str()).collect();
    assert_eq!(bodies, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn test_create_makes_parent_directories() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested/deeper/out.jsonl");

    let mut writer = RecordWriter::create(&path).await.unwrap();
    writer.append(&record("x")).await.unwrap();
    writer.finish().await.unwrap();

    assert!(path.exists());
}

#[tokio::test]
async fn test_create_fails_with_io_error() {
    let dir = tempdir().unwrap();
    // a directory where the file should go
    let path = dir.path().join("taken");
    fs::create_dir(&path).unwrap();

    assert!(matches!(
        RecordWriter::create(&path).await,
        Err(Error::Io { .. })
    ));
}

#[tokio::test]
async fn test_malformed_line_stops_the_sequence() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mixed.jsonl");
    let good = serde_json::to_string(&record("ok")).unwrap();
    fs::write(&path, format!("{good}\n{{\"body\": oops}}\n{good}\n")).unwrap();

    let (records, err) = read_all(&path).await;
    assert_eq!(records.len(), 1);
    assert!(matches!(err, Some(Error::Decode { line: Some(2), .. })));
}

#[tokio::test]
async fn test_blank_lines_are_skipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gaps.jsonl");
    let good = serde_json::to_string(&record("ok")).unwrap();
    fs::write(&path, format!("\n{good}\n   \n{good}\n\n")).unwrap();

    let (records, err) = read_all(&path).await;
    assert!(err.is_none());
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        RecordReader::open(dir.path().join("nope.jsonl")).await,
        Err(Error::Io { .. })
    ));
}

#[tokio::test]
async fn test_legacy_array_files_are_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("capture.json");
    fs::write(
        &path,
        r#"[{"body":"a","subject":"s"},{"body":"b","correlationID":"c-1"}]"#,
    )
    .unwrap();

    let (records, err) = read_all(&path).await;
    assert!(err.is_none());
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].subject.as_deref(), Some("s"));
    assert_eq!(records[1].correlation_id.as_deref(), Some("c-1"));
}

#[tokio::test]
async fn test_malformed_legacy_array_is_a_decode_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, r#"[{"body":"a"},"#).unwrap();

    let (records, err) = read_all(&path).await;
    assert!(records.is_empty());
    assert!(matches!(err, Some(Error::Decode { line: None, .. })));
}

#[tokio::test]
async fn test_list_candidate_files_filters_by_extension() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("b.jsonl"), "").unwrap();
    fs::write(dir.path().join("a.jsonl"), "").unwrap();
    fs::write(dir.path().join("notes.txt"), "").unwrap();
    fs::write(dir.path().join("legacy.json"), "[]").unwrap();
    fs::create_dir(dir.path().join("dir.jsonl")).unwrap();

    let files = list_candidate_files(dir.path()).await.unwrap();
    assert_eq!(files.into_iter().collect::<Vec<_>>(), vec!["a.jsonl", "b.jsonl"]);
}

#[tokio::test]
async fn test_list_candidate_files_empty_dir_is_ok() {
    let dir = tempdir().unwrap();
    assert!(list_candidate_files(dir.path()).await.unwrap().is_empty());
}

#[test]
fn test_default_drain_file_name() {
    let now = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
    assert_eq!(
        default_drain_file_name("orders", "billing", &now),
        "orders-billing-20240309-070501-dlq-messages.jsonl"
    );
}

fn pairs(names: &[(&str, &str)]) -> Vec<(String, String)> {
    names
        .iter()
        .map(|(t, s)| (t.to_string(), s.to_string()))
        .collect()
}

#[tokio::test]
async fn test_latest_drain_file_goes_by_name_stamp() {
    let dir = tempdir().unwrap();
    for name in [
        "orders-billing-20240309-070501-dlq-messages.jsonl",
        "orders-audit-20240310-000000-dlq-messages.jsonl",
        "orders-zeta-20240101-000000-dlq-messages.jsonl",
        "payments-ledger-20250101-000000-dlq-messages.jsonl",
        "orders-notes.jsonl",
    ] {
        fs::write(dir.path().join(name), "").unwrap();
    }
    let known = pairs(&[
        ("orders", "billing"),
        ("orders", "audit"),
        ("orders", "zeta"),
        ("payments", "ledger"),
    ]);

    let latest = latest_drain_file(dir.path(), "orders", &known).await.unwrap();
    assert_eq!(
        latest,
        Some(dir.path().join("orders-audit-20240310-000000-dlq-messages.jsonl"))
    );
    assert_eq!(
        latest_drain_file(dir.path(), "shipping", &known).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_latest_drain_file_ignores_topics_sharing_a_prefix() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("orders-billing-20240101-000000-dlq-messages.jsonl"),
        "",
    )
    .unwrap();
    fs::write(
        dir.path().join("orders-eu-billing-20250101-000000-dlq-messages.jsonl"),
        "",
    )
    .unwrap();
    let known = pairs(&[("orders", "billing"), ("orders-eu", "billing")]);

    assert_eq!(
        latest_drain_file(dir.path(), "orders", &known).await.unwrap(),
        Some(dir.path().join("orders-billing-20240101-000000-dlq-messages.jsonl"))
    );
    assert_eq!(
        latest_drain_file(dir.path(), "orders-eu", &known).await.unwrap(),
        Some(dir.path().join("orders-eu-billing-20250101-000000-dlq-messages.jsonl"))
    );
}

#[tokio::test]
async fn test_latest_drain_file_skips_names_claimed_by_two_topics() {
    let dir = tempdir().unwrap();
    // both orders/eu-billing and orders-eu/billing produce this name
    fs::write(
        dir.path().join("orders-eu-billing-20250101-000000-dlq-messages.jsonl"),
        "",
    )
    .unwrap();
    let known = pairs(&[("orders", "eu-billing"), ("orders-eu", "billing")]);

    assert_eq!(latest_drain_file(dir.path(), "orders", &known).await.unwrap(), None);
    assert_eq!(
        latest_drain_file(dir.path(), "orders-eu", &known).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_invalid_utf8_line_is_a_decode_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bytes.jsonl");
    let good = serde_json::to_string(&record("ok")).unwrap();
    let mut content = format!("{good}\n").into_bytes();
    content.extend_from_slice(b"{\"body\":\"\xff\xfe\"}\n");
    fs::write(&path, content).unwrap();

    let (records, err) = read_all(&path).await;
    assert_eq!(records.len(), 1);
    assert!(matches!(err, Some(Error::Decode { line: Some(2), .. })));
}
