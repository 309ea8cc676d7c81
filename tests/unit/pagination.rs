//! Pager completeness and ordering under both continuation styles

use serde_json::{json, Value};
use slack_exporter::fetcher::pagination::{CursorPager, PagePolicy, PageToken};
use slack_exporter::fetcher::{FetcherError, FetcherResult};
use std::sync::{Arc, Mutex};

/// Helper struct to track fetch calls
#[derive(Clone)]
struct FetchTracker {
    tokens: Arc<Mutex<Vec<Option<PageToken>>>>,
}

impl FetchTracker {
    fn new() -> Self {
        Self {
            tokens: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn record(&self, token: &Option<PageToken>) {
        self.tokens.lock().unwrap().push(token.clone());
    }

    fn get_count(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    fn tokens(&self) -> Vec<Option<PageToken>> {
        self.tokens.lock().unwrap().clone()
    }
}

fn items(n: usize) -> Vec<Value> {
    (0..n).map(|i| json!({"id": i})).collect()
}

/// Cursor-style page starting at the offset encoded in `token`
fn cursor_page(all: &[Value], page_size: usize, token: Option<PageToken>) -> FetcherResult<Value> {
    let offset = match token {
        None => 0,
        Some(PageToken::Cursor(c)) => c.parse().unwrap(),
        Some(other) => panic!("unexpected token {other:?}"),
    };
    let end = (offset + page_size).min(all.len());
    let next = if end < all.len() { end.to_string() } else { String::new() };
    Ok(json!({
        "ok": true,
        "items": &all[offset..end],
        "response_metadata": {"next_cursor": next},
    }))
}

/// Counted-style page `token` (1-based)
fn counted_page(all: &[Value], page_size: usize, token: Option<PageToken>) -> FetcherResult<Value> {
    let page = match token {
        None => 1,
        Some(PageToken::Page(p)) => p as usize,
        Some(other) => panic!("unexpected token {other:?}"),
    };
    let pages = all.len().div_ceil(page_size);
    let start = ((page - 1) * page_size).min(all.len());
    let end = (start + page_size).min(all.len());
    Ok(json!({
        "ok": true,
        "items": &all[start..end],
        "paging": {"page": page, "pages": pages},
    }))
}

fn extract(page: &Value) -> FetcherResult<Vec<Value>> {
    Ok(page["items"].as_array().cloned().unwrap_or_default())
}

async fn collect_with(
    policy: PagePolicy,
    all: &[Value],
    page_size: usize,
    tracker: &FetchTracker,
) -> FetcherResult<Vec<Value>> {
    let pager = CursorPager::new();
    pager
        .collect(
            |token| {
                tracker.record(&token);
                let page = match policy {
                    PagePolicy::Counted(_) => counted_page(all, page_size, token),
                    _ => cursor_page(all, page_size, token),
                };
                async move { page }
            },
            extract,
            &policy,
        )
        .await
}

#[tokio::test]
async fn test_cursor_pagination_is_complete_and_ordered() {
    for n in [0, 1, 5, 6, 7, 200, 201] {
        for page_size in [1, 2, 3, 200] {
            let all = items(n);
            let tracker = FetchTracker::new();
            let got = collect_with(PagePolicy::cursor(), &all, page_size, &tracker)
                .await
                .unwrap();
            assert_eq!(got, all, "n={n} page_size={page_size}");

            let expected_pages = n.div_ceil(page_size).max(1);
            assert_eq!(tracker.get_count(), expected_pages, "n={n} page_size={page_size}");
        }
    }
}

#[tokio::test]
async fn test_counted_pagination_is_complete_and_ordered() {
    for n in [0, 1, 99, 100, 101, 250] {
        for page_size in [1, 7, 100] {
            let all = items(n);
            let tracker = FetchTracker::new();
            let got = collect_with(PagePolicy::counted(), &all, page_size, &tracker)
                .await
                .unwrap();
            assert_eq!(got, all, "n={n} page_size={page_size}");
            assert_eq!(
                tracker.get_count(),
                n.div_ceil(page_size).max(1),
                "n={n} page_size={page_size}"
            );
        }
    }
}

#[tokio::test]
async fn test_first_request_has_no_token_and_tokens_follow_pages() {
    let all = items(5);
    let tracker = FetchTracker::new();
    collect_with(PagePolicy::counted(), &all, 2, &tracker).await.unwrap();

    assert_eq!(
        tracker.tokens(),
        [None, Some(PageToken::Page(2)), Some(PageToken::Page(3))]
    );
}

#[tokio::test]
async fn test_fetch_error_aborts_pagination() {
    let tracker = FetchTracker::new();
    let all = items(10);
    let pager = CursorPager::new();

    let result = pager
        .collect(
            |token| {
                tracker.record(&token);
                let page = if tracker.get_count() == 3 {
                    Err(FetcherError::ApiError("conversations.history: ratelimited".into()))
                } else {
                    cursor_page(&all, 2, token)
                };
                async move { page }
            },
            extract,
            &PagePolicy::cursor(),
        )
        .await;

    assert!(matches!(result, Err(FetcherError::ApiError(_))));
    assert_eq!(tracker.get_count(), 3, "no page is requested after the failure");
}

#[tokio::test]
async fn test_repeated_cursor_is_rejected() {
    let pager = CursorPager::new();
    let result = pager
        .collect(
            |_token| async {
                Ok::<_, FetcherError>(json!({"items": [1], "response_metadata": {"next_cursor": "same"}}))
            },
            extract,
            &PagePolicy::cursor(),
        )
        .await;

    assert!(matches!(result, Err(FetcherError::PaginationError(_))));
}

#[tokio::test]
async fn test_max_pages_guard() {
    let pager = CursorPager::new().with_max_pages(3);
    let calls = Arc::new(Mutex::new(0u32));
    let result = pager
        .collect(
            |_token| {
                let mut n = calls.lock().unwrap();
                *n += 1;
                let page = json!({"items": [*n], "paging": {"page": *n, "pages": 100}});
                async move { Ok::<_, FetcherError>(page) }
            },
            extract,
            &PagePolicy::counted(),
        )
        .await;

    assert!(matches!(result, Err(FetcherError::PaginationError(_))));
    assert_eq!(*calls.lock().unwrap(), 3);
}

#[tokio::test]
async fn test_single_page_policy_fetches_once() {
    let tracker = FetchTracker::new();
    let pager = CursorPager::new();
    let got = pager
        .collect(
            |token| {
                tracker.record(&token);
                async { Ok::<_, FetcherError>(json!({"items": [1, 2, 3], "response_metadata": {"next_cursor": "x"}})) }
            },
            extract,
            &PagePolicy::Single,
        )
        .await
        .unwrap();

    assert_eq!(got, [json!(1), json!(2), json!(3)]);
    assert_eq!(tracker.get_count(), 1);
}
