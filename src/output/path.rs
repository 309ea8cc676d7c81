//! On-disk layout of an export tree
//!
//! Everything lives under one export root:
//!
//! ```text
//! conversations.json
//! users.json
//! emojis.json
//! files.json
//! conversations/<name>/history.json
//! conversations/<name>/meta.json
//! conversations/<name>/members.json
//! conversations/<name>/pins.json
//! conversations/<name>/replies/<ts>.json
//! files/<file-id>.<filetype>
//! ```
//!
//! # Usage Example
//!
//! ```rust
//! use slack_exporter::output::ExportLayout;
//! use std::path::Path;
//!
//! let layout = ExportLayout::new("export");
//! let dir = layout.conversation_dir("general");
//! assert_eq!(dir, Path::new("export/conversations/general"));
//! assert_eq!(
//!     layout.replies_file("general", "1512085950.000216"),
//!     Path::new("export/conversations/general/replies/1512085950.000216.json")
//! );
//! ```

use super::{OutputError, OutputResult};
use std::path::{Path, PathBuf};

/// Conversation list file name
pub const CONVERSATIONS_FILE: &str = "conversations.json";
/// User list file name
pub const USERS_FILE: &str = "users.json";
/// Emoji list file name
pub const EMOJIS_FILE: &str = "emojis.json";
/// File-metadata list file name
pub const FILES_FILE: &str = "files.json";
/// Directory holding one subtree per conversation
pub const CONVERSATIONS_DIR: &str = "conversations";
/// Directory holding downloaded binaries
pub const FILES_DIR: &str = "files";
/// Advisory lock file claimed for the duration of a run
pub const LOCK_FILE: &str = ".export.lock";

/// Path policy for an export root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLayout {
    root: PathBuf,
}

impl ExportLayout {
    /// Layout rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Export root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `conversations.json`
    pub fn conversations_file(&self) -> PathBuf {
        self.root.join(CONVERSATIONS_FILE)
    }

    /// `users.json`
    pub fn users_file(&self) -> PathBuf {
        self.root.join(USERS_FILE)
    }

    /// `emojis.json`
    pub fn emojis_file(&self) -> PathBuf {
        self.root.join(EMOJIS_FILE)
    }

    /// `files.json`
    pub fn files_file(&self) -> PathBuf {
        self.root.join(FILES_FILE)
    }

    /// `conversations/`
    pub fn conversations_dir(&self) -> PathBuf {
        self.root.join(CONVERSATIONS_DIR)
    }

    /// `conversations/<name>/`, with `name` sanitized
    pub fn conversation_dir(&self, name: &str) -> PathBuf {
        self.conversations_dir().join(sanitize_name(name))
    }

    /// `conversations/<name>/history.json`
    pub fn history_file(&self, name: &str) -> PathBuf {
        self.conversation_dir(name).join("history.json")
    }

    /// `conversations/<name>/meta.json`
    pub fn meta_file(&self, name: &str) -> PathBuf {
        self.conversation_dir(name).join("meta.json")
    }

    /// `conversations/<name>/members.json`
    pub fn members_file(&self, name: &str) -> PathBuf {
        self.conversation_dir(name).join("members.json")
    }

    /// `conversations/<name>/pins.json`
    pub fn pins_file(&self, name: &str) -> PathBuf {
        self.conversation_dir(name).join("pins.json")
    }

    /// `conversations/<name>/replies/`
    pub fn replies_dir(&self, name: &str) -> PathBuf {
        self.conversation_dir(name).join("replies")
    }

    /// `conversations/<name>/replies/<ts>.json`
    pub fn replies_file(&self, name: &str, ts: &str) -> PathBuf {
        self.replies_dir(name)
            .join(format!("{}.json", sanitize_name(ts)))
    }

    /// `files/`
    pub fn files_dir(&self) -> PathBuf {
        self.root.join(FILES_DIR)
    }

    /// `files/<file_name>`, with `file_name` sanitized
    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.files_dir().join(sanitize_name(file_name))
    }

    /// `.export.lock`
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Create the root and `conversations/`, failing if either exists as a non-directory
    pub fn ensure_directories(&self) -> OutputResult<()> {
        for dir in [self.root.clone(), self.conversations_dir()] {
            ensure_dir(&dir)?;
        }
        Ok(())
    }
}

/// Create `dir` (and parents) unless it already is a directory
pub fn ensure_dir(dir: &Path) -> OutputResult<()> {
    if dir.exists() && !dir.is_dir() {
        return Err(OutputError::NotADirectory(dir.to_path_buf()));
    }
    std::fs::create_dir_all(dir).map_err(|e| {
        OutputError::IoError(format!(
            "Failed to create directory {}: {}",
            dir.display(),
            e
        ))
    })
}

/// Sanitize a name for use as a single path component
///
/// - `..` → `__` (parent directory reference)
/// - `/`, `\`, `:` → `_` (directory separators)
/// - a lone `.` → `_`
///
/// Case is preserved.
pub fn sanitize_name(name: &str) -> String {
    let sanitized = name.replace("..", "__").replace(['/', '\\', ':'], "_");
    if sanitized == "." {
        "_".to_string()
    } else {
        sanitized
    }
}
