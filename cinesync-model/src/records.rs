use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::ModelError;
use crate::identity::ParsedIdentity;
use crate::ids::SweepId;
use crate::media::ResolvedMedia;

/// Pipeline stage of a single source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProcessingStage {
    Discovered,
    Parsed,
    PendingResolve,
    Resolved,
    AwaitingDisambiguation,
    Linking,
    Linked,
    Skipped,
    Failed,
    /// Tombstone left behind once the source file is confirmed gone.
    Removed,
}

impl ProcessingStage {
    pub const ALL: [ProcessingStage; 10] = [
        ProcessingStage::Discovered,
        ProcessingStage::Parsed,
        ProcessingStage::PendingResolve,
        ProcessingStage::Resolved,
        ProcessingStage::AwaitingDisambiguation,
        ProcessingStage::Linking,
        ProcessingStage::Linked,
        ProcessingStage::Skipped,
        ProcessingStage::Failed,
        ProcessingStage::Removed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Discovered => "discovered",
            ProcessingStage::Parsed => "parsed",
            ProcessingStage::PendingResolve => "pending_resolve",
            ProcessingStage::Resolved => "resolved",
            ProcessingStage::AwaitingDisambiguation => {
                "awaiting_disambiguation"
            }
            ProcessingStage::Linking => "linking",
            ProcessingStage::Linked => "linked",
            ProcessingStage::Skipped => "skipped",
            ProcessingStage::Failed => "failed",
            ProcessingStage::Removed => "removed",
        }
    }

    /// Stages a file only leaves through an operator action or a new
    /// filesystem event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingStage::Linked
                | ProcessingStage::Skipped
                | ProcessingStage::Failed
                | ProcessingStage::Removed
        )
    }

    /// Stages that are parked on an operator decision.
    pub fn awaits_operator(&self) -> bool {
        matches!(
            self,
            ProcessingStage::AwaitingDisambiguation | ProcessingStage::Linking
        )
    }
}

impl Display for ProcessingStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStage {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProcessingStage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| ModelError::InvalidStage(s.to_string()))
    }
}

/// Failure taxonomy recorded on processing records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ErrorKind {
    ParseFailure,
    AmbiguousMatch,
    ResolverTransient,
    NotFound,
    ProviderRejected,
    LinkConflict,
    Filesystem,
    Persistence,
}

impl ErrorKind {
    const ALL: [ErrorKind; 8] = [
        ErrorKind::ParseFailure,
        ErrorKind::AmbiguousMatch,
        ErrorKind::ResolverTransient,
        ErrorKind::NotFound,
        ErrorKind::ProviderRejected,
        ErrorKind::LinkConflict,
        ErrorKind::Filesystem,
        ErrorKind::Persistence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ParseFailure => "parse_failure",
            ErrorKind::AmbiguousMatch => "ambiguous_match",
            ErrorKind::ResolverTransient => "resolver_transient",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ProviderRejected => "provider_rejected",
            ErrorKind::LinkConflict => "link_conflict",
            ErrorKind::Filesystem => "filesystem",
            ErrorKind::Persistence => "persistence",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ModelError::InvalidErrorKind(s.to_string()))
    }
}

/// Classified error attached to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RecordError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Persisted unit of work state, keyed by source path.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessingRecord {
    pub source_path: PathBuf,
    pub stage: ProcessingStage,
    pub last_error: Option<RecordError>,
    pub retry_count: u32,
    pub identity: Option<ParsedIdentity>,
    pub resolved: Option<ResolvedMedia>,
    pub link_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingRecord {
    pub fn discovered(source_path: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            source_path: source_path.into(),
            stage: ProcessingStage::Discovered,
            last_error: None,
            retry_count: 0,
            identity: None,
            resolved: None,
            link_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.stage == ProcessingStage::Removed
    }

    /// Moves the record to `stage`, touching `updated_at`.
    pub fn advance(&mut self, stage: ProcessingStage) {
        self.stage = stage;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, error: RecordError) {
        self.last_error = Some(error);
        self.advance(ProcessingStage::Failed);
    }
}

/// One link created by the symlink manager.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SymlinkRecord {
    pub link_path: PathBuf,
    /// Target exactly as written into the link (absolute or relative).
    pub target_path: PathBuf,
    pub source_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_verified_at: DateTime<Utc>,
}

/// Computed location for a link under the destination root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DestinationPath {
    pub root: PathBuf,
    pub relative: PathBuf,
}

impl DestinationPath {
    pub fn new(root: impl Into<PathBuf>, relative: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            relative: relative.into(),
        }
    }

    pub fn absolute(&self) -> PathBuf {
        self.root.join(&self.relative)
    }

    pub fn relative(&self) -> &Path {
        &self.relative
    }
}

impl Display for DestinationPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.absolute().display())
    }
}

/// A link found broken during a sweep pass.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BrokenLinkEntry {
    pub sweep_id: SweepId,
    pub link_path: PathBuf,
    /// Raw link target as read during the sweep.
    pub target: PathBuf,
    pub sweep_started_at: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
}
