//! Resumability of an export
//!
//! There is no manifest: a destination that exists is a completed unit.
//! [`ResumableSink`] turns "compute and persist" into a no-op for finished units
//! and commits new ones atomically; [`ExportLock`] keeps two runs off one root.

pub mod lock;
pub mod sink;

pub use lock::{ExportLock, LockError};
pub use sink::{ResumableSink, SinkError, SinkOutcome, StagedWrite};
