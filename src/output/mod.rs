//! Export tree layout

use std::path::PathBuf;

pub mod path;

pub use path::{sanitize_name, ExportLayout};

/// Output layout errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// A path that must be a directory exists as something else
    #[error("{} exists but is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
