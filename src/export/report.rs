//! End-of-run report
//!
//! Every unit of work the orchestrator attempts lands here exactly once, so a
//! run always ends with a complete picture of what was done, skipped or failed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::metrics::record_unit;

/// Kind of unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// One top-level list (`conversations.json`, ...)
    TopLevel,
    /// One conversation's full detail set
    Conversation,
    /// One file download
    File,
    /// A stage that could not start
    Stage,
}

impl UnitKind {
    /// Stable label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::TopLevel => "top_level",
            UnitKind::Conversation => "conversation",
            UnitKind::File => "file",
            UnitKind::Stage => "stage",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    /// At least one destination was written
    Completed,
    /// Everything already existed
    Skipped,
    /// The unit was abandoned at its first unrecoverable error
    Failed {
        /// Error description
        reason: String,
    },
}

impl UnitStatus {
    fn label(&self) -> &'static str {
        match self {
            UnitStatus::Completed => "completed",
            UnitStatus::Skipped => "skipped",
            UnitStatus::Failed { .. } => "failed",
        }
    }
}

/// One report line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    /// Kind of unit
    pub kind: UnitKind,
    /// Unit name (file name, conversation name or file id)
    pub unit: String,
    /// Outcome
    #[serde(flatten)]
    pub status: UnitStatus,
}

/// Summary of an export run
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Every attempted unit, in processing order
    pub units: Vec<UnitReport>,
    /// Whether the run stopped early on a shutdown request
    pub cancelled: bool,
}

impl Default for ExportReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportReport {
    /// Empty report started now
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            units: Vec::new(),
            cancelled: false,
        }
    }

    /// Record the outcome of a unit
    pub fn record(&mut self, kind: UnitKind, unit: impl Into<String>, status: UnitStatus) {
        record_unit(kind.as_str(), status.label());
        self.units.push(UnitReport {
            kind,
            unit: unit.into(),
            status,
        });
    }

    /// Mark the run as stopped by a shutdown request
    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Stamp the finish time
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Number of completed units
    pub fn completed(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Completed))
    }

    /// Number of skipped units
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Skipped))
    }

    /// Number of failed units
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Failed { .. }))
    }

    /// Failed units
    pub fn failures(&self) -> impl Iterator<Item = &UnitReport> {
        self.units
            .iter()
            .filter(|u| matches!(u.status, UnitStatus::Failed { .. }))
    }

    /// Outcome of a named unit, if it was attempted
    pub fn status_of(&self, kind: UnitKind, unit: &str) -> Option<&UnitStatus> {
        self.units
            .iter()
            .find(|u| u.kind == kind && u.unit == unit)
            .map(|u| &u.status)
    }

    /// Whether any unit failed
    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// One-line human summary, followed by one line per failure
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "{} completed, {} skipped, {} failed{}",
            self.completed(),
            self.skipped(),
            self.failed(),
            if self.cancelled { " (cancelled)" } else { "" }
        )];

        for unit in self.failures() {
            if let UnitStatus::Failed { reason } = &unit.status {
                lines.push(format!("  [FAILED] {} {}: {}", unit.kind, unit.unit, reason));
            }
        }

        lines.join("\n")
    }

    fn count(&self, predicate: impl Fn(&UnitStatus) -> bool) -> usize {
        self.units.iter().filter(|u| predicate(&u.status)).count()
    }
}
