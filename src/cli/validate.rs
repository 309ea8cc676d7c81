//! Validation subcommand
//!
//! Offline check of an export tree: no API calls, no writes.

use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use super::export::{Cli, OutputFormat};
use super::CliError;
use crate::output::{sanitize_name, ExportLayout};
use crate::{Conversation, FileMeta, Message};

/// Validate command for checking an export tree
#[derive(Parser, Debug)]
pub struct ValidateCommand {}

/// Findings of one validation pass
#[derive(Debug, Default, Serialize)]
pub struct TreeValidation {
    /// Conversations listed in `conversations.json`
    pub conversations: usize,
    /// Conversations with an exported subtree
    pub exported_conversations: usize,
    /// Thread roots found in exported histories
    pub threads: usize,
    /// Files listed in `files.json`
    pub files: usize,
    /// Files present under `files/`
    pub downloaded_files: usize,
    /// Everything that is wrong or incomplete
    pub problems: Vec<String>,
}

impl TreeValidation {
    /// Whether the tree is complete and consistent
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }

    fn problem(&mut self, message: impl Into<String>) {
        self.problems.push(message.into());
    }
}

impl ValidateCommand {
    /// Execute the validation command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let layout = ExportLayout::new(cli.root.clone());
        let validation = validate_tree(&layout)?;

        match cli.output_format {
            OutputFormat::Json => {
                let json = serde_json::to_string(&validation).map_err(|e| {
                    CliError::ConfigurationError(format!("failed to render validation: {e}"))
                })?;
                println!("{json}");
            }
            OutputFormat::Human => {
                println!("Export root: {}", layout.root().display());
                println!(
                    "  Conversations: {} listed, {} exported",
                    validation.conversations, validation.exported_conversations
                );
                println!("  Threads: {}", validation.threads);
                println!(
                    "  Files: {} listed, {} downloaded",
                    validation.files, validation.downloaded_files
                );
                for problem in &validation.problems {
                    println!("  - {problem}");
                }
                println!("\nSummary:");
                if validation.is_valid() {
                    println!("  Export tree is complete");
                } else {
                    println!("  Problems found: {}", validation.problems.len());
                }
            }
        }

        if validation.is_valid() {
            Ok(())
        } else {
            Err(CliError::ValidationFailed {
                problems: validation.problems.len(),
            })
        }
    }
}

/// Check every file an export would have produced
///
/// # Errors
/// Only when the root itself is unusable; everything else is a problem entry.
pub fn validate_tree(layout: &ExportLayout) -> Result<TreeValidation, CliError> {
    let root = layout.root();
    if !root.is_dir() {
        return Err(CliError::InvalidArgument(format!(
            "{} is not an export directory",
            root.display()
        )));
    }

    let mut validation = TreeValidation::default();

    let users = load_json(&layout.users_file(), &mut validation);
    expect_array(users.as_ref(), "users.json", &mut validation);
    if let Some(emojis) = load_json(&layout.emojis_file(), &mut validation) {
        if !emojis.is_object() {
            validation.problem("emojis.json: expected a JSON object");
        }
    }

    let conversations = load_json(&layout.conversations_file(), &mut validation);
    if let Some(records) = expect_array(conversations.as_ref(), "conversations.json", &mut validation) {
        validate_conversations(layout, records, &mut validation);
    }

    let files = load_json(&layout.files_file(), &mut validation);
    if let Some(records) = expect_array(files.as_ref(), "files.json", &mut validation) {
        validate_files(layout, records, &mut validation);
    }

    Ok(validation)
}

fn validate_conversations(layout: &ExportLayout, records: &[Value], validation: &mut TreeValidation) {
    validation.conversations = records.len();

    let mut by_dir: HashMap<String, Vec<String>> = HashMap::new();
    let mut parsed = Vec::new();
    for raw in records {
        match Conversation::from_json(raw) {
            Ok(conversation) => {
                by_dir
                    .entry(sanitize_name(&conversation.name))
                    .or_default()
                    .push(conversation.id.to_string());
                parsed.push(conversation);
            }
            Err(e) => validation.problem(format!("conversations.json: {e}")),
        }
    }

    let mut collisions: Vec<_> = by_dir.iter().filter(|(_, ids)| ids.len() > 1).collect();
    collisions.sort();
    for (dir, ids) in collisions {
        validation.problem(format!(
            "conversations/{dir}: name collision between {}",
            ids.join(", ")
        ));
    }

    for conversation in parsed {
        let name = conversation.name.as_str();
        if !layout.conversation_dir(name).is_dir() {
            continue;
        }
        validation.exported_conversations += 1;

        for path in [
            layout.meta_file(name),
            layout.members_file(name),
            layout.pins_file(name),
        ] {
            load_json(&path, validation);
        }

        let history_path = layout.history_file(name);
        let history = load_json(&history_path, validation);
        let label = format!("conversations/{}/history.json", sanitize_name(name));
        let Some(messages) = expect_array(history.as_ref(), &label, validation) else {
            continue;
        };

        for raw in messages {
            match Message::from_json(raw) {
                Ok(message) if message.is_thread_root() => {
                    validation.threads += 1;
                    let replies = layout.replies_file(name, &message.ts);
                    if !replies.exists() {
                        validation.problem(format!(
                            "{}: replies of thread {} not exported",
                            label, message.ts
                        ));
                    }
                }
                Ok(_) => {}
                Err(e) => validation.problem(format!("{label}: {e}")),
            }
        }
    }
}

fn validate_files(layout: &ExportLayout, records: &[Value], validation: &mut TreeValidation) {
    validation.files = records.len();

    for raw in records {
        match FileMeta::from_json(raw) {
            Ok(meta) => {
                if layout.file_path(&meta.file_name()).is_file() {
                    validation.downloaded_files += 1;
                } else {
                    validation.problem(format!("files/{}: not downloaded", meta.file_name()));
                }
            }
            Err(e) => validation.problem(format!("files.json: {e}")),
        }
    }
}

/// Parse a JSON file, recording a problem when it is missing or invalid
fn load_json(path: &Path, validation: &mut TreeValidation) -> Option<Value> {
    let display = display_path(path);
    let contents = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            validation.problem(format!("{display}: missing"));
            return None;
        }
        Err(e) => {
            validation.problem(format!("{display}: cannot read: {e}"));
            return None;
        }
    };

    match serde_json::from_slice(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            validation.problem(format!("{display}: invalid JSON: {e}"));
            None
        }
    }
}

fn expect_array<'a>(
    value: Option<&'a Value>,
    label: &str,
    validation: &mut TreeValidation,
) -> Option<&'a Vec<Value>> {
    match value? {
        Value::Array(items) => Some(items),
        _ => {
            validation.problem(format!("{label}: expected a JSON array"));
            None
        }
    }
}

fn display_path(path: &Path) -> String {
    let parts: Vec<_> = path
        .components()
        .rev()
        .take(3)
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.into_iter().rev().collect::<Vec<_>>().join("/")
}
