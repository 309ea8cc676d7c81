//! Export run configuration

use crate::downloader::config::{DEFAULT_FILE_BUDGET, DEFAULT_FILE_WINDOW};
use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Pattern matching every conversation
pub const MATCH_ALL: &str = ".*";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Conversation pattern is not a valid regular expression
    #[error("invalid conversation pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Pattern as given
        pattern: String,
        /// Underlying regex error
        #[source]
        source: regex::Error,
    },
}

/// Conversation name filter, anchored at the start of the name
///
/// `^g` and `g` behave the same: both select names beginning with "g".
/// The pattern does not need to consume the whole name.
#[derive(Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    /// Compile `pattern`
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|source| {
            ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Whether `name` matches from its first character
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// Pattern as given
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Default for NamePattern {
    fn default() -> Self {
        Self {
            source: MATCH_ALL.to_string(),
            regex: Regex::new("^(?:.*)").unwrap_or_else(|_| unreachable!("static pattern")),
        }
    }
}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamePattern").field(&self.source).finish()
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// What to export and where
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Export root directory
    pub root: PathBuf,
    /// Conversations to expand
    pub pattern: NamePattern,
    /// Pull a missing top-level list on demand instead of failing
    pub auto_pull: bool,
    /// File downloads admitted per window
    pub file_budget: usize,
    /// File download window
    pub file_window: Duration,
}

impl ExportConfig {
    /// Defaults for `root`: every conversation, auto-pull on, 1 file per 3 s
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pattern: NamePattern::default(),
            auto_pull: true,
            file_budget: DEFAULT_FILE_BUDGET,
            file_window: DEFAULT_FILE_WINDOW,
        }
    }

    /// Only expand conversations matching `pattern`
    pub fn with_pattern(mut self, pattern: NamePattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Enable or disable auto-pull of missing top-level lists
    pub fn with_auto_pull(mut self, auto_pull: bool) -> Self {
        self.auto_pull = auto_pull;
        self
    }

    /// File download budget: `budget` calls per `window`
    pub fn with_file_budget(mut self, budget: usize, window: Duration) -> Self {
        self.file_budget = budget;
        self.file_window = window;
        self
    }
}
