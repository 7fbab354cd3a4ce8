//! Periodic broken-link sweeps over the destination and vault folders.
//!
//! A sweep only classifies; purging is a separate step that re-checks every
//! entry right before deleting it. Links that appeared or changed after the
//! sweep started are never touched.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cinesync_model::{BrokenLinkEntry, SweepId};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::link::SymlinkManager;
use crate::persist::{BatchWriter, WriteOp};

/// Modification times closer than this to the sweep start count as newer
/// than the sweep; FAT and some network mounts store two-second stamps.
const MTIME_SLACK_SECS: i64 = 2;

/// Result of purging one sweep's entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub purged: Vec<PathBuf>,
    /// Entries that no longer matched what the sweep saw.
    pub spared: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct Auditor {
    links: Arc<SymlinkManager>,
    writer: Option<Arc<BatchWriter>>,
}

impl Auditor {
    pub fn new(links: Arc<SymlinkManager>, writer: Option<Arc<BatchWriter>>) -> Self {
        Self { links, writer }
    }

    /// Walk `dirs` and report every symlink whose target is unreachable.
    pub async fn sweep(&self, dirs: &[PathBuf]) -> Vec<BrokenLinkEntry> {
        let sweep_id = SweepId::new();
        let started_at = Utc::now();
        let mut broken = Vec::new();
        let mut scanned = 0usize;

        for root in dirs {
            match fs::metadata(root).await {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => {
                    warn!(target: "cinesync::audit", dir = %root.display(), "not a directory; skipping");
                    continue;
                }
                Err(e) => {
                    warn!(target: "cinesync::audit", dir = %root.display(), error = %e, "audit directory unavailable");
                    continue;
                }
            }

            let mut stack = vec![root.clone()];
            while let Some(dir) = stack.pop() {
                let mut entries = match fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(target: "cinesync::audit", dir = %dir.display(), error = %e, "cannot read directory");
                        continue;
                    }
                };

                loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break,
                        Err(e) => {
                            warn!(target: "cinesync::audit", dir = %dir.display(), error = %e, "directory listing failed");
                            break;
                        }
                    };
                    let Ok(file_type) = entry.file_type().await else {
                        continue;
                    };
                    let path = entry.path();

                    if file_type.is_dir() {
                        stack.push(path);
                        continue;
                    }
                    if !file_type.is_symlink() {
                        continue;
                    }

                    scanned += 1;
                    if let Some(target) = classify(&path, started_at).await {
                        debug!(
                            target: "cinesync::audit",
                            link = %path.display(),
                            target_path = %target.display(),
                            "broken link"
                        );
                        broken.push(BrokenLinkEntry {
                            sweep_id,
                            link_path: path,
                            target,
                            sweep_started_at: started_at,
                            detected_at: Utc::now(),
                        });
                    }
                }
            }
        }

        info!(
            target: "cinesync::audit",
            %sweep_id,
            scanned,
            broken = broken.len(),
            "sweep finished"
        );
        broken
    }

    /// Delete the links of `entries` that are still broken exactly as the
    /// sweep recorded them.
    pub async fn purge(&self, entries: &[BrokenLinkEntry]) -> PurgeReport {
        let mut report = PurgeReport::default();

        for entry in entries {
            let link = entry.link_path.as_path();
            let removed = self
                .links
                .with_path_lock(link, || async move {
                    if !still_broken(entry).await {
                        return Ok(false);
                    }
                    fs::remove_file(link).await.map(|()| true)
                })
                .await;

            match removed {
                Ok(true) => {
                    warn!(
                        target: "cinesync::audit",
                        link = %link.display(),
                        target_path = %entry.target.display(),
                        sweep_id = %entry.sweep_id,
                        "purged broken link"
                    );
                    self.links.forget(link);
                    self.links.prune_empty_parents(link).await;
                    if let Some(writer) = &self.writer {
                        let ops = [
                            WriteOp::DeleteLink(entry.link_path.clone()),
                            WriteOp::AppendAudit(entry.clone()),
                        ];
                        if let Err(e) = writer.submit_all(ops) {
                            warn!(target: "cinesync::audit", error = %e, "audit log write rejected");
                        }
                    }
                    report.purged.push(entry.link_path.clone());
                }
                Ok(false) => {
                    debug!(target: "cinesync::audit", link = %link.display(), "changed since sweep; left alone");
                    report.spared.push(entry.link_path.clone());
                }
                Err(e) => {
                    warn!(target: "cinesync::audit", link = %link.display(), error = %e, "failed to purge link");
                    report.spared.push(entry.link_path.clone());
                }
            }
        }

        report
    }

    /// Sweep and purge on a fixed schedule until `cancel` fires.
    pub async fn run_periodic(
        self: Arc<Self>,
        dirs: Vec<PathBuf>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let entries = self.sweep(&dirs).await;
                    if cancel.is_cancelled() {
                        break;
                    }
                    if !entries.is_empty() {
                        let report = self.purge(&entries).await;
                        info!(
                            target: "cinesync::audit",
                            purged = report.purged.len(),
                            spared = report.spared.len(),
                            "purge finished"
                        );
                    }
                }
            }
        }
        debug!(target: "cinesync::audit", "audit loop stopped");
    }
}

/// Target of `link` if it is broken and was last touched well before
/// `started_at`.
async fn classify(link: &Path, started_at: DateTime<Utc>) -> Option<PathBuf> {
    let meta = fs::symlink_metadata(link).await.ok()?;
    if touched_since(&meta, started_at) {
        return None;
    }
    let target = fs::read_link(link).await.ok()?;
    unreachable_target(link).await.then_some(target)
}

async fn still_broken(entry: &BrokenLinkEntry) -> bool {
    let link = entry.link_path.as_path();
    let Ok(meta) = fs::symlink_metadata(link).await else {
        return false;
    };
    if !meta.file_type().is_symlink() || touched_since(&meta, entry.sweep_started_at) {
        return false;
    }
    match fs::read_link(link).await {
        Ok(target) if target == entry.target => unreachable_target(link).await,
        _ => false,
    }
}

async fn unreachable_target(link: &Path) -> bool {
    match fs::metadata(link).await {
        Ok(_) => false,
        Err(e) => matches!(
            e.kind(),
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
        ),
    }
}

fn touched_since(meta: &std::fs::Metadata, instant: DateTime<Utc>) -> bool {
    let horizon = instant - chrono::Duration::seconds(MTIME_SLACK_SECS);
    meta.modified()
        .map(|modified| DateTime::<Utc>::from(modified) > horizon)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use cinesync_config::LinksConfig;

    use super::*;

    #[tokio::test]
    async fn sweep_reports_only_unreachable_links() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib");
        fs::create_dir_all(lib.join("Movies/A")).await.unwrap();
        let alive = dir.path().join("alive.mkv");
        fs::write(&alive, b"x").await.unwrap();

        fs::symlink(&alive, lib.join("Movies/A/ok.mkv")).await.unwrap();
        fs::symlink(dir.path().join("gone.mkv"), lib.join("Movies/A/broken.mkv"))
            .await
            .unwrap();
        backdate(&lib.join("Movies/A/ok.mkv"));
        backdate(&lib.join("Movies/A/broken.mkv"));

        let auditor = Auditor::new(
            Arc::new(SymlinkManager::new(&lib, &LinksConfig::default())),
            None,
        );
        let broken = auditor.sweep(std::slice::from_ref(&lib)).await;
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].link_path, lib.join("Movies/A/broken.mkv"));
        assert_eq!(broken[0].target, dir.path().join("gone.mkv"));

        let report = auditor.purge(&broken).await;
        assert_eq!(report.purged, vec![lib.join("Movies/A/broken.mkv")]);
        assert!(fs::symlink_metadata(lib.join("Movies/A/ok.mkv")).await.is_ok());
    }

    fn backdate(link: &Path) {
        let past = filetime::FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_symlink_file_times(link, past, past).unwrap();
    }

    #[tokio::test]
    async fn links_touched_at_sweep_start_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib");
        fs::create_dir_all(&lib).await.unwrap();
        let fresh = lib.join("fresh.mkv");
        let old = lib.join("old.mkv");
        fs::symlink(dir.path().join("gone.mkv"), &fresh).await.unwrap();
        fs::symlink(dir.path().join("gone.mkv"), &old).await.unwrap();
        backdate(&old);

        let auditor = Auditor::new(
            Arc::new(SymlinkManager::new(&lib, &LinksConfig::default())),
            None,
        );
        let broken = auditor.sweep(std::slice::from_ref(&lib)).await;
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].link_path, old);

        // a stamp one second before the start is within the slack
        let meta = std::fs::symlink_metadata(&fresh).unwrap();
        let start = DateTime::<Utc>::from(meta.modified().unwrap()) + chrono::Duration::seconds(1);
        assert!(touched_since(&meta, start));
        assert!(!touched_since(&meta, start + chrono::Duration::seconds(MTIME_SLACK_SECS)));
    }

    #[tokio::test]
    async fn missing_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let auditor = Auditor::new(
            Arc::new(SymlinkManager::new(dir.path(), &LinksConfig::default())),
            None,
        );
        assert!(auditor.sweep(&[dir.path().join("nope")]).await.is_empty());
    }
}
