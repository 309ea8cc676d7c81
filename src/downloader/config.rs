//! Retry and throttling configuration constants

use std::time::Duration;

/// Default number of retries for a failed request.
/// With exponential backoff the total worst-case wait stays around one minute.
pub const MAX_RETRIES: u32 = 5;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30000; // 30 seconds

/// Longest `Retry-After` the client is willing to honour.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(120);

/// Default budget for binary file downloads: calls per window.
pub const DEFAULT_FILE_BUDGET: usize = 1;

/// Default window for binary file downloads.
pub const DEFAULT_FILE_WINDOW: Duration = Duration::from_secs(3);

/// Default budget for list/object endpoints (Slack tier 3: ~50 calls per minute).
pub const DEFAULT_LIST_BUDGET: usize = 50;

/// Default window for list/object endpoints.
pub const DEFAULT_LIST_WINDOW: Duration = Duration::from_secs(60);

/// Calculate exponential backoff delay
pub fn calculate_backoff(retry_count: u32) -> Duration {
    let factor = 2u64.checked_pow(retry_count).unwrap_or(u64::MAX);
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(factor).min(MAX_BACKOFF_MS);
    Duration::from_millis(delay_ms)
}
