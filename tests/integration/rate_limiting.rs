//! Integration tests for rate limiting functionality

use slack_exporter::downloader::{RateLimitError, RateLimiter};
use slack_exporter::ExportOrchestrator;
use slack_exporter::ExportReport;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

use crate::support::fake_api::FakeSlack;

/// Run one throttled operation per duration, one after another,
/// returning the instant each one completed
async fn completions(limiter: &RateLimiter, durations: &[Duration]) -> Vec<Instant> {
    let mut times = Vec::with_capacity(durations.len());
    for &duration in durations {
        let done: Result<Instant, RateLimitError> = limiter
            .throttled(|| async move {
                tokio::time::sleep(duration).await;
                Ok(Instant::now())
            })
            .await;
        times.push(done.unwrap());
    }
    times
}

#[tokio::test]
async fn test_no_window_holds_more_than_budget_completions() {
    let window = Duration::from_millis(150);
    let budget = 2;
    let limiter = RateLimiter::new(budget, window);

    let durations: Vec<_> = [0, 120, 0, 60, 0, 140, 0]
        .into_iter()
        .map(Duration::from_millis)
        .collect();
    let times = completions(&limiter, &durations).await;

    // Any budget + 1 consecutive completions must span at least one window
    for run in times.windows(budget + 1) {
        let span = run[budget].duration_since(run[0]);
        assert!(span >= window, "{} completions within {:?}", budget + 1, span);
    }
}

#[tokio::test]
async fn test_slow_call_then_fast_call_are_a_window_apart() {
    let window = Duration::from_millis(300);
    let limiter = RateLimiter::new(1, window);

    let times = completions(
        &limiter,
        &[Duration::from_millis(250), Duration::ZERO],
    )
    .await;

    let gap = times[1].duration_since(times[0]);
    assert!(gap >= window, "completions {gap:?} apart");
}

#[tokio::test]
async fn test_first_budget_calls_are_immediate() {
    let limiter = RateLimiter::new(4, Duration::from_secs(30));
    let start = Instant::now();
    completions(&limiter, &[Duration::ZERO; 4]).await;
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_budget() {
    let window = Duration::from_millis(200);
    let limiter = RateLimiter::new(1, window);
    let times = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for delay in [50u64, 0, 100] {
        let limiter = limiter.clone();
        let times = times.clone();
        handles.push(tokio::spawn(async move {
            limiter
                .throttled(|| async {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    times.lock().unwrap().push(Instant::now());
                    Ok::<_, RateLimitError>(())
                })
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut times = times.lock().unwrap().clone();
    times.sort();
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= window);
    }
}

#[tokio::test]
async fn test_file_downloads_respect_budget() {
    let temp = TempDir::new().unwrap();
    let api = Arc::new(
        FakeSlack::new()
            .with_file("F1", "a.txt", b"a")
            .with_file("F2", "b.txt", b"b")
            .with_file("F3", "c.txt", b"c"),
    );
    let window = Duration::from_millis(150);
    let config = slack_exporter::ExportConfig::new(temp.path()).with_file_budget(1, window);
    let orchestrator = ExportOrchestrator::new(api.clone(), config);

    let start = Instant::now();
    let mut report = ExportReport::new();
    orchestrator.download_files(&mut report).await.unwrap();

    assert_eq!(report.completed(), 4, "files.json plus three downloads");
    assert!(start.elapsed() >= window * 2);
    assert_eq!(api.downloads().len(), 3);
}

#[tokio::test]
async fn test_skipped_files_do_not_consume_budget() {
    let temp = TempDir::new().unwrap();
    let api = Arc::new(
        FakeSlack::new()
            .with_file("F1", "a.txt", b"a")
            .with_file("F2", "b.txt", b"b"),
    );
    let config = slack_exporter::ExportConfig::new(temp.path())
        .with_file_budget(1, Duration::from_millis(10));
    ExportOrchestrator::new(api.clone(), config)
        .download_files(&mut ExportReport::new())
        .await
        .unwrap();

    // A long window would stall the second run if skips were throttled
    let config = slack_exporter::ExportConfig::new(temp.path())
        .with_file_budget(1, Duration::from_secs(30));
    let start = Instant::now();
    let mut report = ExportReport::new();
    ExportOrchestrator::new(api.clone(), config)
        .download_files(&mut report)
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(report.skipped(), 2);
}
