//! Export orchestration
//!
//! A fixed pipeline, run once per invocation:
//!
//! 1. **Top-level lists**: conversations, users, emojis, file metadata
//! 2. **Filter**: conversations whose name matches the [`NamePattern`]
//! 3. **Per conversation**: history, metadata, members, pins, then one replies
//!    file per thread root found in the persisted history
//! 4. **Files**: every file in `files.json`, throttled by the file [`RateLimiter`]
//!
//! Every destination goes through [`ResumableSink`], so a re-run only fetches
//! what is missing. Units (one top-level list, one conversation, one file) are
//! isolated from each other: the first error abandons the unit, gets recorded
//! in the [`ExportReport`], and the run moves on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::downloader::rate_limit::RateLimiter;
use crate::fetcher::{fetch_resource, ApiCall, CursorPager, ExportApi, FetcherError};
use crate::metrics::record_bytes_written;
use crate::output::{path::ensure_dir, sanitize_name, ExportLayout, OutputError};
use crate::resume::{ExportLock, LockError, ResumableSink, SinkError, SinkOutcome};
use crate::shutdown::SharedShutdown;
use crate::{Conversation, FileMeta, MalformedRecord, Message};

pub mod config;
pub mod report;

pub use config::{ConfigError, ExportConfig, NamePattern};
pub use report::{ExportReport, UnitKind, UnitReport, UnitStatus};

/// Export errors
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Remote fetch failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetcherError),

    /// Destination could not be written
    #[error("write failed: {0}")]
    Sink(#[from] SinkError),

    /// A persisted record lacks a field the export depends on
    #[error(transparent)]
    Malformed(#[from] MalformedRecord),

    /// Layout problem under the export root
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// A persisted file could not be read back
    #[error("failed to read {}: {message}", path.display())]
    Read {
        /// File that was read
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// Required input is missing or the destination is unusable
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Several conversations map to one directory
    #[error("name collision: conversations {ids:?} all map to directory '{directory}'")]
    NameCollision {
        /// Sanitized directory name
        directory: String,
        /// Ids of every colliding conversation
        ids: Vec<String>,
    },

    /// Export root is held by another run
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Drives a full or partial export against an [`ExportApi`]
pub struct ExportOrchestrator {
    api: Arc<dyn ExportApi>,
    config: ExportConfig,
    layout: ExportLayout,
    pager: CursorPager,
    file_limiter: RateLimiter,
    shutdown: Option<SharedShutdown>,
    show_progress: bool,
}

impl ExportOrchestrator {
    /// Orchestrator exporting through `api` according to `config`
    pub fn new(api: Arc<dyn ExportApi>, config: ExportConfig) -> Self {
        let layout = ExportLayout::new(config.root.clone());
        let file_limiter = RateLimiter::new(config.file_budget, config.file_window).named("files");
        Self {
            api,
            config,
            layout,
            pager: CursorPager::new(),
            file_limiter,
            shutdown: None,
            show_progress: false,
        }
    }

    /// Stop between units once `shutdown` is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Show a progress bar over the file stage
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Replace the pager (e.g. a lower page limit)
    pub fn with_pager(mut self, pager: CursorPager) -> Self {
        self.pager = pager;
        self
    }

    /// Export layout in use
    pub fn layout(&self) -> &ExportLayout {
        &self.layout
    }

    /// Run all four stages
    ///
    /// # Errors
    /// Only run-level problems are returned (unusable root, root locked by
    /// another run). Everything else is recorded in the report.
    pub async fn run(&self) -> Result<ExportReport, ExportError> {
        let _lock = self.prepare()?;
        let mut report = ExportReport::new();

        info!(root = %self.layout.root().display(), pattern = %self.config.pattern, "Starting export");

        self.top_level_stage(&mut report)
            .instrument(info_span!("stage", name = "top_level"))
            .await;

        // Stage 1 already tried every missing list; do not pull again
        if !report.cancelled {
            if let Err(e) = self
                .conversation_stage(&mut report, false)
                .instrument(info_span!("stage", name = "conversations"))
                .await
            {
                warn!(error = %e, "Conversation stage could not start");
                report.record(UnitKind::Stage, "conversations", failed(&e));
            }
        }

        if !report.cancelled {
            if let Err(e) = self
                .file_stage(&mut report, false)
                .instrument(info_span!("stage", name = "files"))
                .await
            {
                warn!(error = %e, "File stage could not start");
                report.record(UnitKind::Stage, "files", failed(&e));
            }
        }

        report.finish();
        info!(
            completed = report.completed(),
            skipped = report.skipped(),
            failed = report.failed(),
            cancelled = report.cancelled,
            "Export finished"
        );
        Ok(report)
    }

    /// Stage 1: the four top-level lists
    pub async fn pull_top_level(&self, report: &mut ExportReport) -> Result<(), ExportError> {
        let _lock = self.prepare()?;
        self.top_level_stage(report)
            .instrument(info_span!("stage", name = "top_level"))
            .await;
        Ok(())
    }

    /// Stages 2 and 3: filter conversations and expand each match
    ///
    /// # Errors
    /// [`ExportError::Precondition`] when `conversations.json` is missing and
    /// auto-pull is disabled; a failed auto-pull is returned as is.
    pub async fn export_conversations(&self, report: &mut ExportReport) -> Result<(), ExportError> {
        let _lock = self.prepare()?;
        self.conversation_stage(report, self.config.auto_pull)
            .instrument(info_span!("stage", name = "conversations"))
            .await
    }

    /// Stage 4: download every file not yet on disk
    ///
    /// # Errors
    /// Same auto-pull rule as [`Self::export_conversations`], for `files.json`.
    pub async fn download_files(&self, report: &mut ExportReport) -> Result<(), ExportError> {
        let _lock = self.prepare()?;
        self.file_stage(report, self.config.auto_pull)
            .instrument(info_span!("stage", name = "files"))
            .await
    }

    fn prepare(&self) -> Result<ExportLock, ExportError> {
        self.layout.ensure_directories().map_err(|e| match e {
            OutputError::NotADirectory(path) => {
                ExportError::Precondition(format!("{} is not a directory", path.display()))
            }
            other => ExportError::Output(other),
        })?;
        Ok(ExportLock::try_acquire(&self.layout.lock_file())?)
    }

    fn shutdown_requested(&self, report: &mut ExportReport) -> bool {
        let requested = self
            .shutdown
            .as_ref()
            .is_some_and(|s| s.is_shutdown_requested());
        if requested && !report.cancelled {
            info!("Shutdown requested, stopping before the next unit");
            report.mark_cancelled();
        }
        requested
    }

    async fn top_level_stage(&self, report: &mut ExportReport) {
        let resources = [
            (ApiCall::ConversationList, self.layout.conversations_file()),
            (ApiCall::UserList, self.layout.users_file()),
            (ApiCall::EmojiList, self.layout.emojis_file()),
            (ApiCall::FileList, self.layout.files_file()),
        ];

        for (call, path) in resources {
            if self.shutdown_requested(report) {
                return;
            }
            self.pull_top_level_file(report, call, &path).await;
        }
    }

    async fn pull_top_level_file(&self, report: &mut ExportReport, call: ApiCall, path: &Path) {
        let unit = file_label(path);
        match self.pull(call, path).await {
            Ok(outcome) => {
                info!(unit = %unit, skipped = outcome.is_skipped(), "Top-level list done");
                report.record(UnitKind::TopLevel, unit, status_of(outcome.is_skipped()));
            }
            Err(e) => {
                warn!(unit = %unit, error = %e, "Top-level list failed");
                report.record(UnitKind::TopLevel, unit, failed(&e));
            }
        }
    }

    /// Make sure a top-level list exists before a stage reads it
    async fn require_top_level(
        &self,
        report: &mut ExportReport,
        call: ApiCall,
        path: &Path,
        auto_pull: bool,
    ) -> Result<(), ExportError> {
        if path.exists() {
            return Ok(());
        }
        if !auto_pull {
            return Err(ExportError::Precondition(format!(
                "{} has not been pulled",
                file_label(path)
            )));
        }

        info!(path = %path.display(), "Auto-pulling missing top-level list");
        match self.pull(call, path).await {
            Ok(outcome) => {
                report.record(UnitKind::TopLevel, file_label(path), status_of(outcome.is_skipped()));
                Ok(())
            }
            Err(e) => {
                report.record(UnitKind::TopLevel, file_label(path), failed(&e));
                Err(e)
            }
        }
    }

    async fn conversation_stage(
        &self,
        report: &mut ExportReport,
        auto_pull: bool,
    ) -> Result<(), ExportError> {
        let list_path = self.layout.conversations_file();
        self.require_top_level(report, ApiCall::ConversationList, &list_path, auto_pull)
            .await?;

        let records = read_array(&list_path)?;
        let mut matched = Vec::new();
        for (index, raw) in records.iter().enumerate() {
            match Conversation::from_json(raw) {
                Ok(conversation) if self.config.pattern.matches(&conversation.name) => {
                    matched.push(conversation)
                }
                Ok(conversation) => {
                    debug!(name = %conversation.name, "Conversation does not match pattern")
                }
                Err(e) => {
                    let unit = record_label(raw, "id", index);
                    warn!(unit = %unit, error = %e, "Malformed conversation record");
                    report.record(UnitKind::Conversation, unit, failed(&ExportError::from(e)));
                }
            }
        }

        info!(
            total = records.len(),
            matched = matched.len(),
            pattern = %self.config.pattern,
            "Conversations selected"
        );

        let collisions = find_collisions(&matched);

        for conversation in &matched {
            if self.shutdown_requested(report) {
                return Ok(());
            }

            if let Some(error) = collisions.get(&sanitize_name(&conversation.name)) {
                warn!(name = %conversation.name, id = %conversation.id, "Conversation name collision");
                report.record(UnitKind::Conversation, conversation.name.clone(), failed(error));
                continue;
            }

            let span = info_span!("conversation", name = %conversation.name, id = %conversation.id);
            let result = self.export_conversation(conversation).instrument(span).await;
            match result {
                Ok(wrote) => {
                    report.record(UnitKind::Conversation, conversation.name.clone(), status_of(!wrote))
                }
                Err(e) => {
                    warn!(name = %conversation.name, error = %e, "Conversation export failed");
                    report.record(UnitKind::Conversation, conversation.name.clone(), failed(&e));
                }
            }
        }

        Ok(())
    }

    /// Export one conversation's subtree; true when anything was written
    async fn export_conversation(&self, conversation: &Conversation) -> Result<bool, ExportError> {
        let name = conversation.name.as_str();
        let id = &conversation.id;
        ensure_dir(&self.layout.conversation_dir(name))?;

        let details = [
            (ApiCall::History(id.clone()), self.layout.history_file(name)),
            (ApiCall::Info(id.clone()), self.layout.meta_file(name)),
            (ApiCall::Members(id.clone()), self.layout.members_file(name)),
            (ApiCall::Pins(id.clone()), self.layout.pins_file(name)),
        ];

        let mut wrote = false;
        for (call, path) in details {
            wrote |= !self.pull(call, &path).await?.is_skipped();
        }

        let history = read_array(&self.layout.history_file(name))?;
        let roots = history
            .iter()
            .map(Message::from_json)
            .filter(|m| m.as_ref().map_or(true, Message::is_thread_root))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(messages = history.len(), threads = roots.len(), "History scanned");

        for root in roots {
            let path = self.layout.replies_file(name, &root.ts);
            wrote |= !self
                .pull(ApiCall::Replies(id.clone(), root.ts.clone()), &path)
                .await?
                .is_skipped();
        }

        if wrote {
            info!("Conversation exported");
        } else {
            debug!("Conversation already complete");
        }
        Ok(wrote)
    }

    async fn file_stage(&self, report: &mut ExportReport, auto_pull: bool) -> Result<(), ExportError> {
        let list_path = self.layout.files_file();
        self.require_top_level(report, ApiCall::FileList, &list_path, auto_pull)
            .await?;
        let records = read_array(&list_path)?;
        ensure_dir(&self.layout.files_dir())?;

        info!(
            files = records.len(),
            budget = self.file_limiter.max_calls(),
            window_secs = self.file_limiter.window().as_secs_f64(),
            "Downloading files"
        );

        let pb = self.progress_bar(records.len() as u64);

        for (index, raw) in records.iter().enumerate() {
            if self.shutdown_requested(report) {
                pb.abandon_with_message("cancelled");
                return Ok(());
            }

            let unit = record_label(raw, "id", index);
            pb.set_message(unit.clone());

            match self.download_file(raw).await {
                Ok(outcome) => {
                    debug!(file = %unit, skipped = outcome.is_skipped(), "File done");
                    report.record(UnitKind::File, unit, status_of(outcome.is_skipped()));
                }
                Err(e) => {
                    warn!(file = %unit, error = %e, "File download failed");
                    report.record(UnitKind::File, unit, failed(&e));
                }
            }
            pb.inc(1);
        }

        pb.finish_with_message("done");
        Ok(())
    }

    async fn download_file(&self, raw: &Value) -> Result<SinkOutcome, ExportError> {
        let meta = FileMeta::from_json(raw)?;
        let path = self.layout.file_path(&meta.file_name());
        let api = self.api.as_ref();
        let limiter = &self.file_limiter;
        let (id, filename, url) = (
            meta.id.as_str(),
            meta.filename.as_str(),
            meta.url_private.as_str(),
        );

        let outcome = ResumableSink::bytes(&path, || async move {
            debug!(file = id, name = filename, "Downloading");
            api.download_file(url, limiter).await.map_err(ExportError::from)
        })
        .await?;

        if let SinkOutcome::Written { bytes } = outcome {
            record_bytes_written(bytes);
        }
        Ok(outcome)
    }

    /// Fetch `call` in full and persist it at `path` unless already there
    async fn pull(&self, call: ApiCall, path: &Path) -> Result<SinkOutcome, ExportError> {
        let api = self.api.as_ref();
        let pager = &self.pager;

        let outcome = ResumableSink::json(path, move || async move {
            debug!(call = %call.label(), "Fetching");
            fetch_resource(api, pager, &call)
                .await
                .map_err(ExportError::from)
        })
        .await?;

        if let SinkOutcome::Written { bytes } = outcome {
            record_bytes_written(bytes);
        }
        Ok(outcome)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// Directory collisions among matched conversations, keyed by sanitized name
fn find_collisions(conversations: &[Conversation]) -> HashMap<String, ExportError> {
    let mut by_dir: HashMap<String, Vec<String>> = HashMap::new();
    for conversation in conversations {
        by_dir
            .entry(sanitize_name(&conversation.name))
            .or_default()
            .push(conversation.id.to_string());
    }

    by_dir
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(directory, ids)| {
            let error = ExportError::NameCollision {
                directory: directory.clone(),
                ids,
            };
            (directory, error)
        })
        .collect()
}

/// Read a persisted JSON array
fn read_array(path: &Path) -> Result<Vec<Value>, ExportError> {
    let read_error = |message: String| ExportError::Read {
        path: path.to_path_buf(),
        message,
    };

    let contents = std::fs::read(path).map_err(|e| read_error(e.to_string()))?;
    match serde_json::from_slice(&contents).map_err(|e| read_error(e.to_string()))? {
        Value::Array(items) => Ok(items),
        _ => Err(read_error("expected a JSON array".to_string())),
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Report label for a raw record: its `field` value, or its position
fn record_label(raw: &Value, field: &str, index: usize) -> String {
    raw.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{index}"))
}

fn status_of(skipped: bool) -> UnitStatus {
    if skipped {
        UnitStatus::Skipped
    } else {
        UnitStatus::Completed
    }
}

fn failed(error: &ExportError) -> UnitStatus {
    UnitStatus::Failed {
        reason: error.to_string(),
    }
}
