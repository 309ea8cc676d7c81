//! CLI error types and conversions

use crate::export::config::ConfigError;
use crate::export::ExportError;
use crate::fetcher::FetcherError;
use crate::metrics::MetricsError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Export error
    #[error("export error: {0}")]
    Export(#[from] ExportError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    Fetcher(#[from] FetcherError),

    /// Invalid export configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Metrics exporter could not start
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// The run finished but some units failed
    #[error("{failed} unit(s) failed; re-run to retry them")]
    Incomplete {
        /// Number of failed units
        failed: usize,
    },

    /// The export tree is incomplete or inconsistent
    #[error("validation found {problems} problem(s)")]
    ValidationFailed {
        /// Number of problems found
        problems: usize,
    },
}
