//! # Slack Exporter Library
//!
//! Exports a Slack workspace into a local directory tree of JSON records and
//! downloaded file attachments. Every step checks the destination first, so an
//! interrupted export can simply be run again and only the missing pieces are fetched.
//!
//! ## Features
//!
//! - **Resumable**: a file that exists on disk is a finished piece of work
//! - **Atomic writes**: records are staged in a temp file and renamed into place
//! - **Pagination**: cursor-style and counted-page list endpoints behind one pager
//! - **Rate Limiting**: file downloads are throttled to a fixed budget per time window
//! - **Failure isolation**: one broken conversation or file never stops the rest of the run
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use slack_exporter::export::{ExportConfig, ExportOrchestrator};
//! use slack_exporter::fetcher::slack_http::SlackHttpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = SlackHttpClient::new("xoxp-...")?;
//! let config = ExportConfig::new("./export");
//! let orchestrator = ExportOrchestrator::new(Arc::new(api), config);
//!
//! let report = orchestrator.run().await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - The [`fetcher::ExportApi`] capability, its Slack binding and the pager
//! - [`downloader`] - Rate limiting and retry/backoff configuration
//! - [`resume`] - Skip-if-exists persistence with atomic writes, and the export lock
//! - [`output`] - On-disk layout of an export
//! - [`export`] - The orchestrator that drives a full export run
//!
//! ## Data Types
//!
//! - [`Conversation`] - A channel, group or direct message
//! - [`Message`] - One entry of a conversation history
//! - [`FileMeta`] - Metadata of an uploaded file

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// CLI command implementations
pub mod cli;

/// Rate limiting and retry configuration
pub mod downloader;

/// Export orchestration
pub mod export;

/// Remote API access and pagination
pub mod fetcher;

/// Metrics collection
pub mod metrics;

/// On-disk export layout
pub mod output;

/// Resumable persistence
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

pub use export::{ExportConfig, ExportOrchestrator, ExportReport};
pub use fetcher::ExportApi;

/// A record that is missing a field the exporter depends on.
///
/// Carries the raw JSON so the offending record can be inspected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("malformed {entity} record: {field} {problem} (record: {raw})")]
pub struct MalformedRecord {
    /// Entity kind ("conversation", "message", "file")
    pub entity: &'static str,
    /// Name of the offending field
    pub field: &'static str,
    /// What is wrong with the field
    pub problem: &'static str,
    /// The raw record as received
    pub raw: Value,
}

impl MalformedRecord {
    fn missing(entity: &'static str, field: &'static str, raw: &Value) -> Self {
        Self {
            entity,
            field,
            problem: "is missing",
            raw: raw.clone(),
        }
    }

    fn invalid(entity: &'static str, field: &'static str, raw: &Value) -> Self {
        Self {
            entity,
            field,
            problem: "has an invalid value",
            raw: raw.clone(),
        }
    }
}

fn non_empty_str<'a>(raw: &'a Value, field: &str) -> Option<&'a str> {
    raw.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn required_str(raw: &Value, entity: &'static str, field: &'static str) -> Result<String, MalformedRecord> {
    non_empty_str(raw, field)
        .map(str::to_string)
        .ok_or_else(|| MalformedRecord::missing(entity, field, raw))
}

/// Canonical conversation identifier (e.g. "C024BE91L")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wrap a raw identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A channel, private group or direct message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Stable remote identifier
    pub id: ConversationId,
    /// Display label, used as the directory key of the conversation
    pub name: String,
}

impl Conversation {
    /// Parse a conversation from a `conversations.list` record
    ///
    /// Direct messages have no `name`; they are keyed by the counterpart user id.
    pub fn from_json(raw: &Value) -> Result<Self, MalformedRecord> {
        let id = required_str(raw, "conversation", "id")?;
        let name = non_empty_str(raw, "name")
            .or_else(|| non_empty_str(raw, "user"))
            .ok_or_else(|| MalformedRecord::missing("conversation", "name", raw))?;

        Ok(Self {
            id: ConversationId(id),
            name: name.to_string(),
        })
    }
}

/// One message of a conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message type (usually "message")
    pub kind: String,
    /// Timestamp id, unique within the conversation
    pub ts: String,
    /// Number of thread replies
    pub reply_count: u64,
}

impl Message {
    /// Parse a message from a history record
    ///
    /// `reply_count` is omitted by Slack for messages without a thread and defaults to 0.
    pub fn from_json(raw: &Value) -> Result<Self, MalformedRecord> {
        let kind = required_str(raw, "message", "type")?;
        let ts = required_str(raw, "message", "ts")?;
        let reply_count = match raw.get("reply_count") {
            None | Some(Value::Null) => 0,
            Some(value) => value
                .as_u64()
                .ok_or_else(|| MalformedRecord::invalid("message", "reply_count", raw))?,
        };

        Ok(Self {
            kind,
            ts,
            reply_count,
        })
    }

    /// Whether this message starts a thread that needs a separate replies pull
    pub fn is_thread_root(&self) -> bool {
        self.reply_count > 0
    }

    /// Message time decoded from the `ts` id ("1512085950.000216")
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let (secs, frac) = self.ts.split_once('.').unwrap_or((&self.ts, "0"));
        let secs: i64 = secs.parse().ok()?;
        let micros: u32 = format!("{frac:0<6}").get(..6)?.parse().ok()?;
        DateTime::from_timestamp(secs, micros * 1_000)
    }
}

/// Metadata of an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Remote file id
    pub id: String,
    /// Resolved file type, used as the extension on disk
    pub filetype: String,
    /// Original file name
    pub filename: String,
    /// Authenticated download location
    pub url_private: String,
}

impl FileMeta {
    /// Parse file metadata from a `files.list` record
    pub fn from_json(raw: &Value) -> Result<Self, MalformedRecord> {
        let id = required_str(raw, "file", "id")?;
        let url_private = required_str(raw, "file", "url_private")?;
        let filename = non_empty_str(raw, "name")
            .or_else(|| non_empty_str(raw, "title"))
            .unwrap_or(&id)
            .to_string();
        let filetype = resolve_filetype(
            &filename,
            non_empty_str(raw, "filetype"),
            non_empty_str(raw, "mimetype"),
        )
        .ok_or_else(|| MalformedRecord::missing("file", "filetype", raw))?;

        Ok(Self {
            id,
            filetype,
            filename,
            url_private,
        })
    }

    /// Name of the downloaded file: `<id>.<filetype>`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id, self.filetype)
    }
}

/// Resolve a file type: filename extension, else declared type, else MIME subtype
pub fn resolve_filetype(
    filename: &str,
    declared: Option<&str>,
    mimetype: Option<&str>,
) -> Option<String> {
    let from_extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty());
    let from_mime = mimetype
        .and_then(|mime| mime.split_once('/'))
        .map(|(_, subtype)| subtype.split(';').next().unwrap_or(subtype).trim())
        .filter(|subtype| !subtype.is_empty());

    from_extension
        .or(declared.filter(|d| !d.is_empty()))
        .or(from_mime)
        .map(str::to_string)
}
