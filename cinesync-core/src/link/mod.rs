//! Symlink creation under the destination root.
//!
//! Every check-then-act on a destination path runs under a per-path async
//! lock, so two workers racing for the same name observe each other's link
//! instead of both creating one.

pub mod index;

use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use cinesync_config::{ConflictPolicy, LinkMode, LinksConfig};
use cinesync_model::{DestinationPath, SymlinkRecord};
use dashmap::DashMap;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::layout::naming::version_suffix;

pub use index::LinkIndex;

/// Highest ` - vN` suffix tried before giving up.
const MAX_VERSIONS: u32 = 99;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Source {0} does not exist")]
    SourceMissing(PathBuf),

    #[error("{0} is outside the destination root")]
    OutsideRoot(PathBuf),

    #[error("{0} is a directory")]
    DirectoryInTheWay(PathBuf),

    #[error("No free version suffix for {0}")]
    VersionsExhausted(PathBuf),
}

impl LinkError {
    fn io(path: &Path, source: io::Error) -> Self {
        LinkError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyLinked,
    /// The destination was occupied and the policy is `skip`.
    ConflictSkipped,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyLinked => f.write_str("already-linked"),
            SkipReason::ConflictSkipped => f.write_str("conflict-skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked {
        record: SymlinkRecord,
        /// Previous link of the same source that was removed.
        replaced: Option<PathBuf>,
    },
    Skipped {
        link_path: PathBuf,
        reason: SkipReason,
    },
    Conflict {
        destination: PathBuf,
        /// `None` when the occupant is not a symlink.
        existing_target: Option<PathBuf>,
    },
}

/// What currently sits at a destination path.
enum Occupant {
    Vacant,
    Link(PathBuf),
    Directory,
    Other,
}

pub struct SymlinkManager {
    root: PathBuf,
    mode: LinkMode,
    policy: ConflictPolicy,
    index: LinkIndex,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl fmt::Debug for SymlinkManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymlinkManager")
            .field("root", &self.root)
            .field("mode", &self.mode)
            .field("policy", &self.policy)
            .field("index", &self.index)
            .field("locked_paths", &self.locks.len())
            .finish()
    }
}

impl SymlinkManager {
    pub fn new(root: impl Into<PathBuf>, config: &LinksConfig) -> Self {
        Self::with_index(root, config, LinkIndex::new())
    }

    pub fn with_index(
        root: impl Into<PathBuf>,
        config: &LinksConfig,
        index: LinkIndex,
    ) -> Self {
        Self {
            root: root.into(),
            mode: config.mode,
            policy: config.conflict_policy,
            index,
            locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> &LinkIndex {
        &self.index
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Link `source` at `destination`, honouring the configured conflict
    /// policy.
    pub async fn ensure_link(
        &self,
        source: &Path,
        destination: &DestinationPath,
    ) -> Result<LinkOutcome, LinkError> {
        let link = self.checked_destination(destination)?;
        ensure_source(source).await?;

        let outcome = {
            let lock = self.lock_for(&link);
            let _guard = lock.lock().await;
            self.link_or_conflict(source, &link).await?
        };
        self.release_lock(&link);
        let outcome = self.retire_previous(source, outcome).await;

        match outcome {
            LinkOutcome::Conflict {
                destination,
                existing_target,
            } => self.apply_policy(source, destination, existing_target).await,
            other => Ok(other),
        }
    }

    /// Replace whatever occupies `destination` with a link to `source`.
    /// Directories are never removed.
    pub async fn force_link(
        &self,
        source: &Path,
        destination: &DestinationPath,
    ) -> Result<LinkOutcome, LinkError> {
        let link = self.checked_destination(destination)?;
        ensure_source(source).await?;

        let result = {
            let lock = self.lock_for(&link);
            let _guard = lock.lock().await;
            match occupant(&link).await? {
                Occupant::Directory => Err(LinkError::DirectoryInTheWay(link.clone())),
                Occupant::Vacant => self.create(source, &link).await,
                Occupant::Link(_) | Occupant::Other => {
                    fs::remove_file(&link)
                        .await
                        .map_err(|e| LinkError::io(&link, e))?;
                    if let Some(previous) = self.index.remove_link(&link) {
                        debug!(
                            target: "cinesync::link",
                            link = %link.display(),
                            previous_source = %previous.source_path.display(),
                            "overwriting link"
                        );
                    }
                    self.create(source, &link).await
                }
            }
        };
        self.release_lock(&link);
        match result {
            Ok(outcome) => Ok(self.retire_previous(source, outcome).await),
            Err(e) => Err(e),
        }
    }

    /// Remove the link owned by `source` and prune empty parent folders.
    /// Returns the removed link path.
    pub async fn remove_for_source(
        &self,
        source: &Path,
    ) -> Result<Option<PathBuf>, LinkError> {
        let Some(link) = self.index.link_for_source(source) else {
            return Ok(None);
        };

        let removed = {
            let lock = self.lock_for(&link);
            let _guard = lock.lock().await;
            let removed = match occupant(&link).await? {
                Occupant::Link(target) if self.points_to(&link, &target, source) => {
                    fs::remove_file(&link)
                        .await
                        .map_err(|e| LinkError::io(&link, e))?;
                    true
                }
                // someone replaced it; leave their file alone
                _ => false,
            };
            self.index.remove_link(&link);
            removed
        };
        self.release_lock(&link);

        if removed {
            self.prune_empty_parents(&link).await;
            info!(
                target: "cinesync::link",
                source = %source.display(),
                link = %link.display(),
                "removed link for deleted source"
            );
            Ok(Some(link))
        } else {
            Ok(None)
        }
    }

    /// Drop a link from the index without touching the filesystem.
    pub fn forget(&self, link: &Path) -> Option<SymlinkRecord> {
        self.index.remove_link(link)
    }

    /// Delete now-empty folders between `link` and the destination root.
    pub async fn prune_empty_parents(&self, link: &Path) {
        let mut current = link.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            // remove_dir refuses non-empty directories
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            debug!(target: "cinesync::link", dir = %dir.display(), "pruned empty folder");
            current = dir.parent();
        }
    }

    fn checked_destination(
        &self,
        destination: &DestinationPath,
    ) -> Result<PathBuf, LinkError> {
        let link = normalize(&destination.absolute());
        if !link.starts_with(normalize(&self.root)) || link == normalize(&self.root) {
            return Err(LinkError::OutsideRoot(link));
        }
        Ok(link)
    }

    async fn link_or_conflict(
        &self,
        source: &Path,
        link: &Path,
    ) -> Result<LinkOutcome, LinkError> {
        match occupant(link).await? {
            Occupant::Vacant => self.create(source, link).await,
            Occupant::Link(target) if self.points_to(link, &target, source) => {
                self.adopt(source, link, target);
                Ok(LinkOutcome::Skipped {
                    link_path: link.to_path_buf(),
                    reason: SkipReason::AlreadyLinked,
                })
            }
            Occupant::Link(target) => Ok(LinkOutcome::Conflict {
                destination: link.to_path_buf(),
                existing_target: Some(target),
            }),
            Occupant::Directory | Occupant::Other => Ok(LinkOutcome::Conflict {
                destination: link.to_path_buf(),
                existing_target: None,
            }),
        }
    }

    async fn apply_policy(
        &self,
        source: &Path,
        destination: PathBuf,
        existing_target: Option<PathBuf>,
    ) -> Result<LinkOutcome, LinkError> {
        match self.policy {
            ConflictPolicy::Prompt => {
                warn!(
                    target: "cinesync::link",
                    source = %source.display(),
                    destination = %destination.display(),
                    existing = ?existing_target,
                    "destination occupied; escalating"
                );
                Ok(LinkOutcome::Conflict {
                    destination,
                    existing_target,
                })
            }
            ConflictPolicy::Skip => {
                info!(
                    target: "cinesync::link",
                    source = %source.display(),
                    destination = %destination.display(),
                    "destination occupied; skipping"
                );
                Ok(LinkOutcome::Skipped {
                    link_path: destination,
                    reason: SkipReason::ConflictSkipped,
                })
            }
            ConflictPolicy::VersionSuffix => {
                for n in 2..=MAX_VERSIONS {
                    let candidate = version_suffix(&destination, n);
                    let outcome = {
                        let lock = self.lock_for(&candidate);
                        let _guard = lock.lock().await;
                        self.link_or_conflict(source, &candidate).await?
                    };
                    self.release_lock(&candidate);
                    if !matches!(outcome, LinkOutcome::Conflict { .. }) {
                        return Ok(self.retire_previous(source, outcome).await);
                    }
                }
                Err(LinkError::VersionsExhausted(destination))
            }
        }
    }

    /// Create the link. Caller holds the lock for `link`; a previous link
    /// of `source` comes back in `replaced` and is retired by
    /// [`Self::retire_previous`] once that lock is released.
    async fn create(&self, source: &Path, link: &Path) -> Result<LinkOutcome, LinkError> {
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| LinkError::io(parent, e))?;
        }

        let target = self.target_for(source, link);
        symlink(&target, link)
            .await
            .map_err(|e| LinkError::io(link, e))?;

        let now = Utc::now();
        let record = SymlinkRecord {
            link_path: link.to_path_buf(),
            target_path: target,
            source_path: source.to_path_buf(),
            created_at: now,
            last_verified_at: now,
        };

        let previous = self.index.link_for_source(source);
        self.index.insert(record.clone());
        let replaced = previous.filter(|old| old.as_path() != link);

        info!(
            target: "cinesync::link",
            source = %source.display(),
            link = %link.display(),
            replaced = ?replaced,
            "linked"
        );
        Ok(LinkOutcome::Linked { record, replaced })
    }

    /// Retire the previous link carried by a fresh `Linked` outcome. Runs
    /// with no other path lock held.
    async fn retire_previous(&self, source: &Path, outcome: LinkOutcome) -> LinkOutcome {
        match outcome {
            LinkOutcome::Linked {
                record,
                replaced: Some(old),
            } => {
                let replaced = self.retire(source, &old).await;
                LinkOutcome::Linked { record, replaced }
            }
            other => other,
        }
    }

    /// Remove a source's previous link after it moved to a new path.
    async fn retire(&self, source: &Path, old: &Path) -> Option<PathBuf> {
        let lock = self.lock_for(old);
        let guard = lock.lock().await;
        let retired = match occupant(old).await {
            Ok(Occupant::Link(target)) if self.points_to(old, &target, source) => {
                match fs::remove_file(old).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            target: "cinesync::link",
                            link = %old.display(),
                            error = %e,
                            "failed to remove relocated link"
                        );
                        false
                    }
                }
            }
            _ => false,
        };
        if self
            .index
            .record(old)
            .is_some_and(|record| record.source_path == source)
        {
            self.index.remove_link(old);
        }
        drop(guard);
        drop(lock);
        self.release_lock(old);

        if retired {
            self.prune_empty_parents(old).await;
            Some(old.to_path_buf())
        } else {
            None
        }
    }

    /// Record a pre-existing correct link the index did not know about.
    fn adopt(&self, source: &Path, link: &Path, target: PathBuf) {
        if self.index.contains_link(link) {
            return;
        }
        let now = Utc::now();
        self.index.insert(SymlinkRecord {
            link_path: link.to_path_buf(),
            target_path: target,
            source_path: source.to_path_buf(),
            created_at: now,
            last_verified_at: now,
        });
    }

    fn target_for(&self, source: &Path, link: &Path) -> PathBuf {
        match self.mode {
            LinkMode::Absolute => source.to_path_buf(),
            LinkMode::Relative => match link.parent() {
                Some(dir) => relative_path(dir, source),
                None => source.to_path_buf(),
            },
        }
    }

    fn points_to(&self, link: &Path, target: &Path, source: &Path) -> bool {
        resolve_target(link, target) == normalize(source)
    }

    /// Hold the per-path lock while `op` runs against `path`.
    pub async fn with_path_lock<F, Fut, T>(&self, path: &Path, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let out = {
            let lock = self.lock_for(path);
            let _guard = lock.lock().await;
            op().await
        };
        self.release_lock(path);
        out
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_lock(&self, path: &Path) {
        self.locks
            .remove_if(path, |_, lock| Arc::strong_count(lock) == 1);
    }
}

async fn ensure_source(source: &Path) -> Result<(), LinkError> {
    match fs::metadata(source).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(LinkError::SourceMissing(source.to_path_buf()))
        }
        Err(e) => Err(LinkError::io(source, e)),
    }
}

async fn occupant(path: &Path) -> Result<Occupant, LinkError> {
    match fs::symlink_metadata(path).await {
        Ok(meta) if meta.file_type().is_symlink() => fs::read_link(path)
            .await
            .map(Occupant::Link)
            .map_err(|e| LinkError::io(path, e)),
        Ok(meta) if meta.is_dir() => Ok(Occupant::Directory),
        Ok(_) => Ok(Occupant::Other),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Occupant::Vacant),
        Err(e) => Err(LinkError::io(path, e)),
    }
}

#[cfg(unix)]
async fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    fs::symlink(target, link).await
}

#[cfg(windows)]
async fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    fs::symlink_file(target, link).await
}

/// Absolute form of a link's target as the OS would follow it.
pub fn resolve_target(link: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        normalize(target)
    } else {
        let base = link.parent().unwrap_or_else(|| Path::new(""));
        normalize(&base.join(target))
    }
}

/// Lexically fold `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Path to `to` expressed relative to directory `from`.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from = normalize(from);
    let to = normalize(to);
    let from_parts: Vec<_> = from.components().collect();
    let to_parts: Vec<_> = to.components().collect();

    let shared = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in shared..from_parts.len() {
        out.push("..");
    }
    for part in &to_parts[shared..] {
        out.push(part.as_os_str());
    }
    out
}
