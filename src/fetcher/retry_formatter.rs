//! Log lines for retried Slack requests

use reqwest::{Error as ReqwestError, StatusCode};
use std::fmt;
use std::time::Duration;

/// Why a retryable attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Request or body read timed out
    Timeout,
    /// Connection could not be established
    Unreachable,
    /// HTTP 429
    Ratelimited,
    /// HTTP 5xx
    Server(u16),
    /// Any other transport failure
    Network,
}

impl FailureKind {
    /// Classify a failed attempt from its status or transport error
    pub fn classify(status: Option<StatusCode>, err: Option<&ReqwestError>) -> Self {
        match (status, err) {
            (Some(StatusCode::TOO_MANY_REQUESTS), _) => Self::Ratelimited,
            (Some(status), _) if status.is_server_error() => Self::Server(status.as_u16()),
            (_, Some(err)) if err.is_timeout() => Self::Timeout,
            (_, Some(err)) if err.is_connect() => Self::Unreachable,
            _ => Self::Network,
        }
    }

    fn hint(&self) -> &'static str {
        match self {
            Self::Timeout | Self::Unreachable | Self::Network => {
                "check connectivity to Slack, or raise --max-retries"
            }
            Self::Ratelimited => "the workspace is being throttled; wait a minute and re-run",
            Self::Server(_) => "Slack is degraded (https://slack-status.com); re-run later",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timed out"),
            Self::Unreachable => f.write_str("unreachable"),
            Self::Ratelimited => f.write_str("rate limited"),
            Self::Server(code) => write!(f, "HTTP {code}"),
            Self::Network => f.write_str("network error"),
        }
    }
}

/// One failed attempt of a request that may be retried
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempt that failed (1-based)
    pub attempt: u32,
    /// Attempts allowed in total
    pub max_attempts: u32,
    /// Failure classification
    pub kind: FailureKind,
    /// Wait before the next attempt
    pub wait: Duration,
    /// Request label, e.g. `conversations.history(C024BE91L)`
    pub label: String,
    /// Error text of the attempt
    pub error: String,
    /// Requested URL
    pub url: String,
}

impl RetryContext {
    /// Context of failed attempt `attempt` out of `max_attempts`
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        kind: FailureKind,
        wait: Duration,
        label: impl Into<String>,
        error: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            kind,
            wait,
            label: label.into(),
            error: error.into(),
            url: url.into(),
        }
    }

    /// `label: attempt 2/6 failed (HTTP 503), retrying in 2.0s`
    pub fn format_retry(&self) -> String {
        format!(
            "{}: attempt {}/{} failed ({}), retrying in {:.1}s",
            self.label,
            self.attempt,
            self.max_attempts,
            self.kind,
            self.wait.as_secs_f64()
        )
    }

    /// Logged when the attempt after this one succeeds
    pub fn format_success(&self) -> String {
        format!(
            "{}: recovered on attempt {}/{}",
            self.label,
            self.attempt + 1,
            self.max_attempts
        )
    }

    /// Logged once every attempt has failed
    pub fn format_failure(&self) -> String {
        format!(
            "{}: giving up after {} attempts ({}): {} [{}]; {}",
            self.label,
            self.max_attempts,
            self.kind,
            self.error,
            self.url,
            self.kind.hint()
        )
    }
}
