//! Cooperative cancellation at each stage of a run

use slack_exporter::export::{UnitKind, UnitStatus};
use slack_exporter::shutdown::ShutdownCoordinator;
use slack_exporter::{ExportConfig, ExportOrchestrator};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::support::fake_api::{file_url, FakeSlack};

fn workspace() -> FakeSlack {
    FakeSlack::new()
        .with_channel("C1", "general")
        .with_history("C1", &[0])
        .with_user("U1")
        .with_file("F1", "a.txt", b"a")
        .with_file("F2", "b.txt", b"b")
        .with_file("F3", "c.txt", b"c")
}

fn orchestrator(api: &Arc<FakeSlack>, root: &Path) -> ExportOrchestrator {
    let config = ExportConfig::new(root).with_file_budget(100, Duration::from_millis(1));
    ExportOrchestrator::new(api.clone(), config)
}

#[tokio::test]
async fn test_shutdown_before_start_fetches_nothing() {
    let temp = TempDir::new().unwrap();
    let api = Arc::new(workspace());
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let report = orchestrator(&api, temp.path())
        .with_shutdown(shutdown)
        .run()
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(report.units.is_empty());
    assert!(api.calls().is_empty());
    assert!(api.downloads().is_empty());
}

#[tokio::test]
async fn test_shutdown_during_top_level_skips_later_stages() {
    let temp = TempDir::new().unwrap();
    let api = Arc::new(workspace());
    let shutdown = ShutdownCoordinator::shared();
    api.shutdown_after("users.list", shutdown.clone());

    let report = orchestrator(&api, temp.path())
        .with_shutdown(shutdown)
        .run()
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(api.calls(), ["conversations.list", "users.list"]);
    assert!(temp.path().join("users.json").exists());
    assert!(!temp.path().join("emojis.json").exists());
    assert_eq!(report.status_of(UnitKind::Conversation, "general"), None);
}

#[tokio::test]
async fn test_shutdown_during_downloads_keeps_finished_files() {
    let temp = TempDir::new().unwrap();
    let api = Arc::new(workspace());
    let shutdown = ShutdownCoordinator::shared();
    api.shutdown_after(file_url("F1"), shutdown.clone());

    let report = orchestrator(&api, temp.path())
        .with_shutdown(shutdown)
        .run()
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.status_of(UnitKind::File, "F1"), Some(&UnitStatus::Completed));
    assert_eq!(report.status_of(UnitKind::File, "F2"), None);
    assert_eq!(api.downloads(), [file_url("F1")]);

    api.reset_log();
    let report = orchestrator(&api, temp.path()).run().await.unwrap();
    assert!(!report.cancelled);
    assert_eq!(report.status_of(UnitKind::File, "F1"), Some(&UnitStatus::Skipped));
    assert_eq!(api.downloads(), [file_url("F2"), file_url("F3")]);
}
