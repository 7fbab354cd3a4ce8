//! Real-time source monitoring.
//!
//! One `notify` watcher per source root feeds classified [`MonitorEvent`]s
//! into a [`Debouncer`](debounce::Debouncer); the debounced sequence is
//! exposed as a [`Stream`]. Calling [`Monitor::start`] again yields a fresh
//! stream with fresh watchers.

pub mod debounce;

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use cinesync_config::{Config, PathsConfig};
use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode};
use notify::{
    Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher,
};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, spawn_blocking};
use tokio_stream::Stream;
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};

pub use debounce::{Debouncer, spawn_debouncer};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MonitorEvent {
    /// A video file appeared or its contents changed.
    Changed(PathBuf),
    /// A file or folder is gone.
    Removed(PathBuf),
    /// Walk this subtree again; emitted for new folders and watcher errors.
    Rescan(PathBuf),
}

impl MonitorEvent {
    pub fn path(&self) -> &Path {
        match self {
            MonitorEvent::Changed(path)
            | MonitorEvent::Removed(path)
            | MonitorEvent::Rescan(path) => path,
        }
    }
}

/// Decides which paths produce events.
#[derive(Debug, Clone)]
pub struct PathFilter {
    paths: PathsConfig,
}

impl PathFilter {
    pub fn new(paths: PathsConfig) -> Self {
        Self { paths }
    }

    /// True when any segment below the owning source root starts with a
    /// dot. Paths outside every root only have their file name checked.
    pub fn is_hidden(&self, path: &Path) -> bool {
        let relative = self
            .paths
            .source_dirs
            .iter()
            .find_map(|root| path.strip_prefix(root).ok());
        match relative {
            Some(relative) => relative.components().any(|component| match component {
                Component::Normal(seg) => seg.to_string_lossy().starts_with('.'),
                _ => false,
            }),
            None => path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.')),
        }
    }

    pub fn accepts_file(&self, path: &Path) -> bool {
        !self.is_hidden(path) && self.paths.is_video_path(path)
    }

    /// Removals can target folders, which carry no extension.
    pub fn accepts_removal(&self, path: &Path) -> bool {
        !self.is_hidden(path)
            && (path.extension().is_none() || self.paths.is_video_path(path))
    }
}

pub struct Monitor {
    roots: Vec<PathBuf>,
    filter: Arc<PathFilter>,
    debounce: Duration,
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("roots", &self.roots)
            .field("debounce", &self.debounce)
            .finish()
    }
}

impl Monitor {
    pub fn new(config: &Config) -> Self {
        Self {
            roots: config.paths.source_dirs.clone(),
            filter: Arc::new(PathFilter::new(config.paths.clone())),
            debounce: config.monitor.debounce(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Attach watchers to every source root and return the debounced event
    /// stream.
    pub async fn start(&self) -> Result<MonitorStream> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let roots = self.roots.clone();
        let filter = Arc::clone(&self.filter);
        let watchers = spawn_blocking(move || init_watchers(&roots, filter, raw_tx))
            .await
            .map_err(|e| CoreError::Watch(format!("watcher initialization panicked: {e}")))??;

        let debounce_task = spawn_debouncer(self.debounce, raw_rx, out_tx);
        info!(
            target: "cinesync::monitor",
            roots = self.roots.len(),
            debounce_ms = self.debounce.as_millis() as u64,
            "monitoring source roots"
        );

        Ok(MonitorStream {
            events: out_rx,
            watchers,
            debounce_task,
        })
    }
}

/// Debounced monitor events. Dropping the stream stops the watchers.
pub struct MonitorStream {
    events: mpsc::UnboundedReceiver<MonitorEvent>,
    watchers: Vec<RecommendedWatcher>,
    debounce_task: JoinHandle<()>,
}

impl fmt::Debug for MonitorStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorStream")
            .field("watcher_count", &self.watchers.len())
            .field("debounce_finished", &self.debounce_task.is_finished())
            .finish()
    }
}

impl Stream for MonitorStream {
    type Item = MonitorEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

impl Drop for MonitorStream {
    fn drop(&mut self) {
        self.debounce_task.abort();
    }
}

fn init_watchers(
    roots: &[PathBuf],
    filter: Arc<PathFilter>,
    tx: mpsc::UnboundedSender<MonitorEvent>,
) -> Result<Vec<RecommendedWatcher>> {
    let mut watchers = Vec::with_capacity(roots.len());
    for root in roots {
        let root_clone = root.clone();
        let filter = Arc::clone(&filter);
        let tx = tx.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                forward_notification(res, &root_clone, &filter, &tx);
            },
            NotifyConfig::default(),
        )
        .map_err(|err| {
            CoreError::Watch(format!(
                "failed to create watcher for {}: {}",
                root.display(),
                err
            ))
        })?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|err| CoreError::Watch(format!("failed to watch {}: {}", root.display(), err)))?;
        watchers.push(watcher);
    }
    Ok(watchers)
}

/// Push the events for one raw notification to `tx`. A watcher error asks
/// for a rescan of `root`. Returns `false` once the receiver is gone.
fn forward_notification(
    res: std::result::Result<Event, notify::Error>,
    root: &Path,
    filter: &PathFilter,
    tx: &mpsc::UnboundedSender<MonitorEvent>,
) -> bool {
    let events = match res {
        Ok(event) => classify_event(&event, filter),
        Err(err) => {
            warn!(
                target: "cinesync::monitor",
                root = %root.display(),
                error = %err,
                "watcher error; requesting rescan"
            );
            vec![MonitorEvent::Rescan(root.to_path_buf())]
        }
    };
    for event in events {
        if tx.send(event).is_err() {
            debug!(target: "cinesync::monitor", root = %root.display(), "event receiver closed");
            return false;
        }
    }
    true
}

/// Map one raw notification onto zero or more monitor events.
pub fn classify_event(event: &Event, filter: &PathFilter) -> Vec<MonitorEvent> {
    let mut out = Vec::new();
    match event.kind {
        EventKind::Create(CreateKind::Folder) => {
            out.extend(event.paths.iter().cloned().map(MonitorEvent::Rescan));
        }
        EventKind::Create(_)
        | EventKind::Modify(
            ModifyKind::Data(_) | ModifyKind::Metadata(_) | ModifyKind::Any | ModifyKind::Other,
        ) => {
            for path in &event.paths {
                if let Some(event) = appeared(path, filter) {
                    out.push(event);
                }
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let Some(old) = event.paths.first()
                && filter.accepts_removal(old)
            {
                out.push(MonitorEvent::Removed(old.clone()));
            }
            if let Some(new) = event.paths.get(1)
                && let Some(event) = appeared(new, filter)
            {
                out.push(event);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in &event.paths {
                if filter.accepts_removal(path) {
                    out.push(MonitorEvent::Removed(path.clone()));
                }
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            // `To`, `Any` and `Other`: trust what is on disk now
            for path in &event.paths {
                if path.exists() {
                    if let Some(event) = appeared(path, filter) {
                        out.push(event);
                    }
                } else if filter.accepts_removal(path) {
                    out.push(MonitorEvent::Removed(path.clone()));
                }
            }
        }
        EventKind::Remove(RemoveKind::Folder) => {
            out.extend(
                event
                    .paths
                    .iter()
                    .filter(|path| !filter.is_hidden(path))
                    .cloned()
                    .map(MonitorEvent::Removed),
            );
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                if filter.accepts_removal(path) {
                    out.push(MonitorEvent::Removed(path.clone()));
                }
            }
        }
        EventKind::Access(_) => {}
        EventKind::Any | EventKind::Other => {
            out.extend(event.paths.iter().cloned().map(MonitorEvent::Rescan));
        }
    }
    out
}

fn appeared(path: &Path, filter: &PathFilter) -> Option<MonitorEvent> {
    if filter.is_hidden(path) {
        return None;
    }
    if path.is_dir() {
        return Some(MonitorEvent::Rescan(path.to_path_buf()));
    }
    filter
        .accepts_file(path)
        .then(|| MonitorEvent::Changed(path.to_path_buf()))
}
