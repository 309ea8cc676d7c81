//! Remote API access
//!
//! The exporter never talks to Slack directly; it goes through the [`ExportApi`]
//! capability, which exposes exactly the calls an export needs. The production
//! binding is [`slack_http::SlackHttpClient`]; tests substitute an in-memory fake.

use crate::downloader::rate_limit::{RateLimitError, RateLimiter};
use crate::{ConversationId, MalformedRecord};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

pub mod pagination;
pub mod retry_formatter;
pub mod slack_config;
pub mod slack_http;

pub use pagination::{CursorPager, PagePolicy, PageToken, PaginationPolicy};

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// HTTP status error
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// API answered with `ok: false`
    #[error("API error: {0}")]
    ApiError(String),

    /// Rate limit exceeded and retries exhausted
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Response is missing structure the pager or extractor relies on
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("network error: {0}")]
    NetworkError(String),

    /// Pagination did not terminate
    #[error("pagination error: {0}")]
    PaginationError(String),

    /// A record is missing an expected field
    #[error(transparent)]
    Malformed(#[from] MalformedRecord),

    /// Throttle failure
    #[error("rate limiter error: {0}")]
    RateLimiter(#[from] RateLimitError),
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// One remote resource the exporter knows how to request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ApiCall {
    /// All conversations visible to the token
    ConversationList,
    /// All workspace users
    UserList,
    /// Custom emoji map
    EmojiList,
    /// Metadata of all files
    FileList,
    /// Message history of a conversation
    History(ConversationId),
    /// Conversation metadata
    Info(ConversationId),
    /// Member ids of a conversation
    Members(ConversationId),
    /// Pinned items of a conversation
    Pins(ConversationId),
    /// Replies of the thread rooted at the given message ts
    Replies(ConversationId, String),
}

impl ApiCall {
    /// Short label for logs and metrics
    pub fn label(&self) -> String {
        let method = self.endpoint().method;
        match self {
            ApiCall::History(id)
            | ApiCall::Info(id)
            | ApiCall::Members(id)
            | ApiCall::Pins(id) => format!("{method}({id})"),
            ApiCall::Replies(id, ts) => format!("{method}({id}, {ts})"),
            _ => method.to_string(),
        }
    }
}

/// Capability interface over the remote API (injected into the orchestrator)
#[async_trait]
pub trait ExportApi: Send + Sync {
    /// Fetch one raw response page of `call`, continuing at `token` when given
    async fn fetch_page(&self, call: &ApiCall, token: Option<PageToken>) -> FetcherResult<Value>;

    /// Download the raw bytes behind an authenticated file URL
    ///
    /// Every request sent for the download, retries included, is admitted by `limiter`.
    async fn download_file(&self, url: &str, limiter: &RateLimiter) -> FetcherResult<Bytes>;
}

/// Fetch a complete resource: every page of a list, or the payload of an object call
///
/// List resources come back as a JSON array of all items in page order.
pub async fn fetch_resource(
    api: &dyn ExportApi,
    pager: &CursorPager,
    call: &ApiCall,
) -> FetcherResult<Value> {
    let endpoint = call.endpoint();
    match endpoint.shape {
        slack_config::ResponseShape::Object => {
            let page = api.fetch_page(call, None).await?;
            page.get(endpoint.payload_field).cloned().ok_or_else(|| {
                FetcherError::InvalidResponse(format!(
                    "{} response has no `{}` field",
                    endpoint.method, endpoint.payload_field
                ))
            })
        }
        slack_config::ResponseShape::List(policy) => {
            let items = pager
                .collect(
                    |token| api.fetch_page(call, token),
                    |page: &Value| extract_items(page, endpoint.method, endpoint.payload_field),
                    &policy,
                )
                .await?;
            Ok(Value::Array(items))
        }
    }
}

/// Extract the item array `field` from a list response page
pub fn extract_items(page: &Value, method: &str, field: &str) -> FetcherResult<Vec<Value>> {
    match page.get(field) {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(FetcherError::InvalidResponse(format!(
            "{method} response field `{field}` is not an array"
        ))),
        None => Err(FetcherError::InvalidResponse(format!(
            "{method} response has no `{field}` field"
        ))),
    }
}
