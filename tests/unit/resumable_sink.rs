//! Skip-if-exists persistence

use serde_json::json;
use slack_exporter::resume::{ResumableSink, SinkError, SinkOutcome};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Debug)]
enum TestError {
    Producer(&'static str),
    Sink(SinkError),
}

impl From<SinkError> for TestError {
    fn from(e: SinkError) -> Self {
        TestError::Sink(e)
    }
}

/// Helper to count producer invocations
#[derive(Clone, Default)]
struct ProducerTracker {
    count: Arc<Mutex<usize>>,
}

impl ProducerTracker {
    fn increment(&self) {
        *self.count.lock().unwrap() += 1;
    }

    fn get_count(&self) -> usize {
        *self.count.lock().unwrap()
    }
}

#[tokio::test]
async fn test_existing_destination_skips_producer() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("users.json");
    std::fs::write(&path, b"[]").unwrap();
    let tracker = ProducerTracker::default();

    let outcome = ResumableSink::json(&path, || {
        tracker.increment();
        async { Ok::<_, TestError>(json!([{"id": "U1"}])) }
    })
    .await
    .unwrap();

    assert_eq!(outcome, SinkOutcome::Skipped);
    assert_eq!(tracker.get_count(), 0);
    assert_eq!(std::fs::read(&path).unwrap(), b"[]");
}

#[tokio::test]
async fn test_missing_destination_is_written_once() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("conversations/general/history.json");
    let tracker = ProducerTracker::default();

    for _ in 0..2 {
        ResumableSink::json(&path, || {
            tracker.increment();
            async { Ok::<_, TestError>(json!([{"type": "message", "ts": "1.0"}])) }
        })
        .await
        .unwrap();
    }

    assert_eq!(tracker.get_count(), 1);
    let written: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(written[0]["ts"], "1.0");
}

#[tokio::test]
async fn test_json_is_pretty_printed() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("emojis.json");

    let outcome = ResumableSink::json(&path, || async {
        Ok::<_, TestError>(json!({"party": "https://emoji/party.gif"}))
    })
    .await
    .unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("\n  \"party\""));
    assert_eq!(
        outcome,
        SinkOutcome::Written {
            bytes: contents.len() as u64
        }
    );
}

#[tokio::test]
async fn test_producer_error_leaves_no_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("files/F1.png");

    let result = ResumableSink::bytes(&path, || async {
        Err::<Vec<u8>, _>(TestError::Producer("connection reset"))
    })
    .await;

    assert!(matches!(result, Err(TestError::Producer("connection reset"))));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_bytes_are_written_verbatim() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("files/F1.bin");
    let payload = vec![0u8, 159, 146, 150, 255];

    let expected = payload.clone();
    ResumableSink::bytes(&path, move || async move { Ok::<_, TestError>(payload) })
        .await
        .unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), expected);
    // Only the destination remains: no temp file is left beside it
    let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_staged_write_is_invisible_until_commit() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("pins.json");

    let staged = ResumableSink::stage(&path, b"[]").unwrap();
    assert!(!path.exists());
    assert!(staged.temp_path().exists());

    let bytes = staged.commit().unwrap();
    assert_eq!(bytes, 2);
    assert_eq!(std::fs::read(&path).unwrap(), b"[]");
}

#[test]
fn test_dropped_stage_is_cleaned_up() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("members.json");

    let staged = ResumableSink::stage(&path, b"[\"U1\"]").unwrap();
    let temp_path = staged.temp_path().to_path_buf();
    drop(staged);

    assert!(!path.exists());
    assert!(!temp_path.exists());
}
