//! Observability metrics for the exporter
//!
//! Counters and histograms for HTTP traffic, retries, rate-limiter waits and
//! export unit outcomes.
//!
//! ## Architecture
//!
//! - Uses the `metrics` crate facade; without an installed recorder every call is a no-op
//! - [`init_metrics`] installs the Prometheus exporter with a scrape endpoint
//! - Recording never blocks or fails the export

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The Prometheus exporter could not be installed
    #[error("failed to install Prometheus exporter: {0}")]
    Install(String),
}

/// Initialize metrics system with Prometheus exporter
///
/// Call once at startup. Idempotent: later calls are ignored.
///
/// # Arguments
/// * `addr` - Socket address to bind the scrape endpoint (e.g., "0.0.0.0:9090")
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        METRICS_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(MetricsError::Install(e.to_string()));
    }

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the Slack API"
    );

    describe_counter!(
        "http_429_errors_total",
        Unit::Count,
        "Total number of 429 rate limit errors received"
    );

    describe_counter!(
        "http_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );

    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );

    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );

    describe_counter!(
        "rate_limit_permits_acquired_total",
        Unit::Count,
        "Total number of rate limit permits acquired"
    );

    describe_gauge!(
        "rate_limit_permits_available",
        Unit::Count,
        "Currently available rate limit permits"
    );

    describe_histogram!(
        "rate_limit_queue_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for rate limit permits"
    );

    describe_counter!(
        "export_units_total",
        Unit::Count,
        "Export units processed, by kind and outcome"
    );

    describe_counter!(
        "export_bytes_written_total",
        Unit::Bytes,
        "Bytes committed to the export tree"
    );

    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Record an HTTP request with timing
pub struct HttpRequestMetrics {
    method: String,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording a new HTTP request
    pub fn start(method: impl Into<String>, attempt: u32) -> Self {
        let method = method.into();
        let correlation_id = generate_correlation_id();

        debug!(
            correlation_id = %correlation_id,
            method = %method,
            attempt = attempt,
            "Starting HTTP request"
        );

        Self {
            method,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record completion of the HTTP request
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "method" => self.method.clone(),
            "status" => status_code.to_string(),
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "method" => self.method.clone(),
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            counter!(
                "http_429_errors_total",
                "method" => self.method.clone(),
            )
            .increment(1);

            warn!(
                correlation_id = %self.correlation_id,
                method = %self.method,
                attempt = self.attempt,
                duration_ms = duration.as_millis(),
                "Rate limit error (429) recorded"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            method = %self.method,
            status = status_code,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    /// Record a network error (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "method" => self.method.clone(),
            "status" => "network_error",
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "method" => self.method.clone(),
        )
        .record(duration.as_secs_f64());

        warn!(
            correlation_id = %self.correlation_id,
            method = %self.method,
            attempt = self.attempt,
            duration_ms = duration.as_millis(),
            "Network error recorded"
        );
    }

    /// Correlation ID of this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "http_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!("retry_backoff_duration_seconds").record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis(),
        "Retry backoff recorded"
    );
}

/// Rate limiter metrics helper
pub struct RateLimiterMetrics {
    limiter: &'static str,
    start_time: Option<Instant>,
}

impl RateLimiterMetrics {
    /// Metrics for the limiter labelled `limiter`
    pub fn new(limiter: &'static str) -> Self {
        Self {
            limiter,
            start_time: None,
        }
    }

    /// Start measuring queue wait time
    pub fn start_acquire(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Record successful permit acquisition
    pub fn record_acquired(&mut self) {
        if let Some(start) = self.start_time.take() {
            let wait_duration = start.elapsed();

            histogram!("rate_limit_queue_wait_seconds", "limiter" => self.limiter)
                .record(wait_duration.as_secs_f64());
            counter!("rate_limit_permits_acquired_total", "limiter" => self.limiter).increment(1);

            if wait_duration.as_millis() > 100 {
                debug!(
                    limiter = self.limiter,
                    wait_ms = wait_duration.as_millis(),
                    "Rate limit permit acquired after wait"
                );
            }
        }
    }

    /// Update available permits gauge
    pub fn update_available_permits(&self, available: usize) {
        gauge!("rate_limit_permits_available", "limiter" => self.limiter).set(available as f64);
    }
}

/// Record the outcome of one export unit (`kind` is e.g. "top_level", "conversation", "file")
pub fn record_unit(kind: &'static str, outcome: &'static str) {
    counter!(
        "export_units_total",
        "kind" => kind,
        "outcome" => outcome,
    )
    .increment(1);
}

/// Record bytes committed to the export tree
pub fn record_bytes_written(bytes: u64) {
    counter!("export_bytes_written_total").increment(bytes);
}
