//! Sliding-window rate limiting
//!
//! At most `max_calls` calls finish within any window of length `window`.
//! Excess callers wait; nothing is ever rejected.

use crate::metrics::RateLimiterMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;
use tracing::trace;

/// Call budget shared by every clone
#[derive(Clone)]
pub struct RateLimiter {
    name: &'static str,
    max_calls: usize,
    semaphore: Arc<Semaphore>,
    window: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("max_calls", &self.max_calls)
            .field("window", &self.window)
            .field("available", &self.semaphore.available_permits())
            .finish()
    }
}

/// A claimed slot; freed one window after it is dropped
struct WindowSlot {
    permit: Option<OwnedSemaphorePermit>,
    window: Duration,
}

impl Drop for WindowSlot {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        // Outside a runtime nobody can wait on the semaphore anymore
        if let Ok(handle) = Handle::try_current() {
            let window = self.window;
            handle.spawn(async move {
                sleep(window).await;
                drop(permit);
            });
        }
    }
}

impl RateLimiter {
    /// Create a limiter allowing `max_calls` calls per `window`
    ///
    /// A budget of zero is treated as one call per window.
    pub fn new(max_calls: usize, window: Duration) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            name: "default",
            max_calls,
            semaphore: Arc::new(Semaphore::new(max_calls)),
            window,
        }
    }

    /// Label used in metrics and logs
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Calls allowed per window
    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }

    async fn claim(&self) -> Result<WindowSlot, RateLimitError> {
        let mut metrics = RateLimiterMetrics::new(self.name);
        metrics.start_acquire();

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RateLimitError::AcquireError(e.to_string()))?;

        metrics.record_acquired();
        metrics.update_available_permits(self.semaphore.available_permits());
        trace!(limiter = self.name, "Rate limit slot acquired");

        Ok(WindowSlot {
            permit: Some(permit),
            window: self.window,
        })
    }

    /// Wait for a free slot and claim it for one window from now
    ///
    /// For calls that complete instantly; anything that takes time should go
    /// through [`Self::throttled`].
    pub async fn acquire(&self) -> Result<(), RateLimitError> {
        self.claim().await.map(drop)
    }

    /// Run `op` once a slot is available
    ///
    /// The slot stays claimed while `op` runs and for one window after it
    /// completes (or is cancelled), so completions of all clones are spaced
    /// to at most `max_calls` per window.
    pub async fn throttled<F, Fut, T, E>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<RateLimitError>,
    {
        let slot = self.claim().await?;
        let result = op().await;
        drop(slot);
        result
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Failed to acquire a slot
    #[error("failed to acquire rate limit permit: {0}")]
    AcquireError(String),
}
