//! Slack Web API HTTP client
//!
//! Production [`ExportApi`] binding:
//! - Bearer-token authentication on every call
//! - API method rate limiting (one shared budget, charged per attempt)
//! - Retry with exponential backoff on network errors, 429 and 5xx
//! - `ok: false` responses surfaced as [`FetcherError::ApiError`]

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::retry_formatter::{FailureKind, RetryContext};
use super::slack_config::DEFAULT_BASE_URL;
use super::{ApiCall, ExportApi, FetcherError, FetcherResult, PageToken};
use crate::downloader::config::{
    calculate_backoff, DEFAULT_LIST_BUDGET, DEFAULT_LIST_WINDOW, MAX_RETRIES, MAX_RETRY_AFTER,
};
use crate::downloader::rate_limit::RateLimiter;
use crate::metrics::{record_retry_backoff, HttpRequestMetrics};

/// Connect timeout for every request
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall request timeout (file downloads included)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// HTTP client for the Slack Web API
pub struct SlackHttpClient {
    client: Client,
    base_url: String,
    token: String,
    rate_limiter: Arc<RateLimiter>,
    max_retries: u32,
}

impl std::fmt::Debug for SlackHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackHttpClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("rate_limiter", &self.rate_limiter)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl SlackHttpClient {
    /// Create a client for `token` against the public Slack API
    ///
    /// # Errors
    /// Returns [`FetcherError::NetworkError`] if the TLS backend cannot be initialized.
    pub fn new(token: impl Into<String>) -> FetcherResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("slack-exporter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetcherError::NetworkError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            rate_limiter: Arc::new(
                RateLimiter::new(DEFAULT_LIST_BUDGET, DEFAULT_LIST_WINDOW).named("api"),
            ),
            max_retries: MAX_RETRIES,
        })
    }

    /// Override the API base URL (e.g. a proxy or a test server)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Share an existing list-endpoint limiter
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Number of retries after the first attempt
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// API base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// One request attempt, admitted by `limiter` and held until its body is read
    async fn attempt<B>(
        &self,
        label: &str,
        attempt: u32,
        limiter: &RateLimiter,
        build: &B,
    ) -> FetcherResult<(HttpRequestMetrics, Result<Reply, reqwest::Error>)>
    where
        B: Fn() -> RequestBuilder,
    {
        limiter
            .throttled(|| async {
                let metrics = HttpRequestMetrics::start(label, attempt);
                let reply = match build().bearer_auth(&self.token).send().await {
                    Ok(response) => {
                        let status = response.status();
                        let headers = response.headers().clone();
                        response.bytes().await.map(|body| Reply {
                            status,
                            headers,
                            body,
                        })
                    }
                    Err(e) => Err(e),
                };
                Ok::<_, FetcherError>((metrics, reply))
            })
            .await
    }

    /// Send the request built by `build`, retrying transient failures
    ///
    /// Every attempt, retries included, takes its own slot from `limiter`.
    ///
    /// Retries on:
    /// - Network errors (timeout, connection refused, truncated body)
    /// - 5xx server errors
    /// - 429 rate limit errors, waiting for `Retry-After` when present
    ///
    /// Does not retry on other 4xx client errors.
    async fn send_with_retry<B>(
        &self,
        label: &str,
        url: &str,
        limiter: &RateLimiter,
        build: B,
    ) -> FetcherResult<Bytes>
    where
        B: Fn() -> RequestBuilder,
    {
        let max_attempts = self.max_retries + 1;
        let mut last_context: Option<RetryContext> = None;
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            let (metrics, reply) = self.attempt(label, attempt + 1, limiter, &build).await?;

            let (error, kind, wait) = match reply {
                Err(e) => {
                    metrics.record_network_error();
                    let kind = FailureKind::classify(None, Some(&e));
                    (
                        FetcherError::NetworkError(e.to_string()),
                        kind,
                        calculate_backoff(attempt),
                    )
                }
                Ok(reply) => {
                    let status = reply.status;
                    metrics.record_complete(status.as_u16());

                    if status.is_success() {
                        if let Some(context) = &last_context {
                            info!("{}", context.format_success());
                        }
                        debug!(label, attempt = attempt + 1, "Request succeeded");
                        return Ok(reply.body);
                    }

                    let kind = FailureKind::classify(Some(status), None);

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let wait = parse_retry_after(&reply.headers)
                            .unwrap_or_else(|| calculate_backoff(attempt));
                        (FetcherError::RateLimitExceeded, kind, wait)
                    } else if status.is_server_error() {
                        (
                            FetcherError::HttpError(format!("Server error: {status}")),
                            kind,
                            calculate_backoff(attempt),
                        )
                    } else {
                        let error_text = String::from_utf8_lossy(&reply.body);
                        warn!(label, status = status.as_u16(), "Client error, not retrying");
                        return Err(FetcherError::HttpError(format!(
                            "Client error {status}: {error_text}"
                        )));
                    }
                }
            };

            let context = RetryContext::new(
                attempt + 1,
                max_attempts,
                kind,
                wait,
                label,
                error.to_string(),
                url,
            );

            if attempt < self.max_retries {
                warn!("{}", context.format_retry());
                record_retry_backoff(wait, attempt + 1);
                tokio::time::sleep(wait).await;
                last_context = Some(context);
                last_error = Some(error);
                continue;
            }

            error!("{}", context.format_failure());
            last_error = Some(error);
        }

        Err(last_error
            .unwrap_or_else(|| FetcherError::NetworkError("All retries exhausted".to_string())))
    }
}

/// A fully received response
struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

#[async_trait]
impl ExportApi for SlackHttpClient {
    async fn fetch_page(&self, call: &ApiCall, token: Option<PageToken>) -> FetcherResult<Value> {
        let endpoint = call.endpoint();
        let url = self.method_url(endpoint.method);
        let params = call.query_params(token.as_ref());
        let label = call.label();

        debug!("Making GET request to: {} with {} params", url, params.len());

        let body = self
            .send_with_retry(&label, &url, &self.rate_limiter, || {
                self.client.get(&url).query(&params)
            })
            .await?;

        let page: Value = serde_json::from_slice(&body).map_err(|e| {
            FetcherError::ParseError(format!("Failed to deserialize {} response: {e}", endpoint.method))
        })?;

        check_ok(&page, endpoint.method)?;
        Ok(page)
    }

    async fn download_file(&self, url: &str, limiter: &RateLimiter) -> FetcherResult<Bytes> {
        self.send_with_retry("file", url, limiter, || self.client.get(url))
            .await
    }
}

/// Turn a Slack `ok: false` envelope into an error
pub fn check_ok(page: &Value, method: &str) -> FetcherResult<()> {
    match page.get("ok").and_then(Value::as_bool) {
        Some(true) => Ok(()),
        Some(false) => {
            let reason = page
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            Err(FetcherError::ApiError(format!("{method}: {reason}")))
        }
        None => Err(FetcherError::InvalidResponse(format!(
            "{method} response has no `ok` flag"
        ))),
    }
}

/// Parse a `Retry-After` header given in seconds, capped at [`MAX_RETRY_AFTER`]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    match value.trim().parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs).min(MAX_RETRY_AFTER)),
        Err(e) => {
            warn!("Failed to parse Retry-After header '{}': {}", value, e);
            None
        }
    }
}
