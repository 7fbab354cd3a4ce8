use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::ids::SourceRootId;

/// A file discovered under a configured source root.
///
/// Entries are immutable: a file that changes on disk produces a fresh
/// entry through the monitor rather than mutating an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceEntry {
    pub root_id: SourceRootId,
    /// Source root this entry was found under.
    pub root: PathBuf,
    /// Absolute path of the file.
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Lowercased extension without the leading dot.
    pub extension: String,
}

impl SourceEntry {
    pub fn new(
        root_id: SourceRootId,
        root: impl Into<PathBuf>,
        path: impl Into<PathBuf>,
        size: u64,
        modified: Option<DateTime<Utc>>,
    ) -> Self {
        let path = path.into();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        Self {
            root_id,
            root: root.into(),
            path,
            size,
            modified,
            extension,
        }
    }

    /// Path relative to the source root. Falls back to the absolute path
    /// if the entry somehow sits outside its root.
    pub fn relative_path(&self) -> &Path {
        self.path.strip_prefix(&self.root).unwrap_or(&self.path)
    }
}
