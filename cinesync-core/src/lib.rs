//! # CineSync Core
//!
//! Library half of the CineSync media organizer: it watches download
//! folders, works out what each video file is, and maintains a clean
//! symlink library that media servers can scan.
//!
//! ## Architecture
//!
//! - [`parse`]: release file names into a [`ParsedIdentity`](cinesync_model::ParsedIdentity)
//! - [`resolve`]: identities into provider records, with caching, retries
//!   and a request budget
//! - [`layout`]: resolved media into library-relative destinations
//! - [`link`]: idempotent symlink creation with conflict policies
//! - [`audit`]: sweeps for and purges dangling links
//! - [`monitor`]: debounced filesystem notifications
//! - [`pipeline`]: the coordinator tying the stages together
//! - [`persist`]: the record store and its batched writer
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cinesync_config::Config;
//! use cinesync_core::{
//!     layout::PathBuilder,
//!     link::SymlinkManager,
//!     parse::NameParser,
//!     persist::{BatchWriter, MemoryStore, WriterConfig},
//!     pipeline::{Coordinator, CoordinatorParts, NoopDecisionObserver},
//!     resolve::{Resolver, ResolverCache, TmdbProvider},
//! };
//!
//! async fn organize(config: Config) -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = Arc::new(TmdbProvider::from_config(&config.resolver)?);
//!     let store = Arc::new(MemoryStore::new());
//!     let writer = Arc::new(BatchWriter::spawn(
//!         store,
//!         WriterConfig::from(&config.persistence),
//!     ));
//!     let parts = CoordinatorParts {
//!         parser: NameParser::from_config(&config.paths),
//!         resolver: Arc::new(Resolver::new(
//!             provider,
//!             ResolverCache::new(),
//!             &config.resolver,
//!         )),
//!         paths: PathBuilder::new(&config),
//!         links: Arc::new(SymlinkManager::new(
//!             &config.paths.destination_dir,
//!             &config.links,
//!         )),
//!         writer,
//!         observer: Arc::new(NoopDecisionObserver),
//!     };
//!
//!     let coordinator = Coordinator::new(&config, parts);
//!     coordinator.start(config.workers.pipeline).await;
//!     coordinator.initial_scan().await;
//!     coordinator.wait_idle().await;
//!     coordinator.shutdown().await;
//!     Ok(())
//! }
//! ```
#![allow(missing_docs)]

pub mod audit;
pub mod error;
pub mod layout;
pub mod link;
pub mod monitor;
pub mod parse;
pub mod persist;
pub mod pipeline;
pub mod resolve;
pub mod retry;
pub mod scan;

pub use audit::{Auditor, PurgeReport};
pub use error::{CoreError, Result};
pub use layout::{PathBuilder, build_path};
pub use link::{LinkError, LinkIndex, LinkOutcome, SkipReason, SymlinkManager};
pub use monitor::{Monitor, MonitorEvent, MonitorStream, PathFilter};
pub use parse::{NameParser, ParseFailure};
pub use persist::{
    BatchWriter, MemoryStore, PersistenceError, RecordStore, SqliteStore,
    WriteOp, WriterConfig, WriterStats,
};
pub use pipeline::{
    Coordinator, CoordinatorParts, DecisionObserver, NoopDecisionObserver,
    Origin, ProcessOutcome,
};
pub use resolve::{
    MetadataProvider, ProviderError, ResolveError, ResolveOutcome, Resolver,
    ResolverCache, TmdbProvider,
};
pub use retry::Backoff;
