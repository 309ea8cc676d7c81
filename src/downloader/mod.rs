//! Throttling and retry policy
//!
//! - [`rate_limit`] - the sliding-window [`RateLimiter`] shared by every throttled call site
//! - [`config`] - retry counts, backoff and default call budgets
//!
//! The HTTP binding applies a list-endpoint limiter to every API call; the export
//! orchestrator wraps each binary file download in a separate, stricter limiter.

pub mod config;
pub mod rate_limit;

pub use rate_limit::{RateLimitError, RateLimiter};
