//! Directory walks over source roots.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::monitor::PathFilter;

/// Every video file under `root`, sorted. Hidden entries are skipped and
/// symlinks are not followed.
pub async fn walk_videos(root: &Path, filter: &PathFilter) -> Vec<PathBuf> {
    let mut found = Vec::new();

    match fs::symlink_metadata(root).await {
        Ok(meta) if meta.is_file() => {
            if filter.accepts_file(root) {
                found.push(root.to_path_buf());
            }
            return found;
        }
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return found,
        Err(e) => {
            warn!(target: "cinesync::pipeline", root = %root.display(), error = %e, "cannot walk path");
            return found;
        }
    }

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(target: "cinesync::pipeline", dir = %dir.display(), error = %e, "cannot read directory");
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(target: "cinesync::pipeline", dir = %dir.display(), error = %e, "directory listing failed");
                    break;
                }
            };
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            let path = entry.path();
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() && filter.accepts_file(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    debug!(target: "cinesync::pipeline", root = %root.display(), files = found.len(), "walk finished");
    found
}
