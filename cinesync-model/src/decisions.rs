use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::media::{ExternalId, MediaCandidate};

/// Why a record is parked waiting on the operator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum DecisionKind {
    /// Several provider candidates matched equally well, best first.
    Disambiguation { candidates: Vec<MediaCandidate> },
    /// The destination is occupied by something that is not our link.
    Conflict {
        destination: PathBuf,
        existing_target: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PendingDecision {
    pub source_path: PathBuf,
    pub kind: DecisionKind,
    pub created_at: DateTime<Utc>,
}

impl PendingDecision {
    pub fn new(source_path: impl Into<PathBuf>, kind: DecisionKind) -> Self {
        Self {
            source_path: source_path.into(),
            kind,
            created_at: Utc::now(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.kind, DecisionKind::Conflict { .. })
    }
}

/// Answer returned by the operator for a pending decision.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "action", content = "value", rename_all = "snake_case"))]
pub enum OperatorDecision {
    /// Index into the disambiguation candidate list.
    AcceptCandidate(usize),
    AcceptExternalId(ExternalId),
    Overwrite,
    Skip,
    /// Link under a different file name in the same folder.
    Rename(String),
}
