//! Core data model definitions shared across CineSync crates.
#![allow(missing_docs)]

pub mod decisions;
pub mod error;
pub mod files;
pub mod identity;
pub mod ids;
pub mod media;
pub mod records;

// Intentionally curated re-exports for downstream consumers.
pub use decisions::{DecisionKind, OperatorDecision, PendingDecision};
pub use error::{ModelError, Result as ModelResult};
pub use files::SourceEntry;
pub use identity::{
    ContentFlags, Edition, ParsedIdentity, QualityInfo, ResolutionTag,
};
pub use ids::{SourceRootId, SweepId};
pub use media::{
    CollectionRef, ExternalId, MediaCandidate, MediaKind, Provider,
    ResolvedMedia,
};
pub use records::{
    BrokenLinkEntry, DestinationPath, ErrorKind, ProcessingRecord,
    ProcessingStage, RecordError, SymlinkRecord,
};
