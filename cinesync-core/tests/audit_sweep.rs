use std::os::unix::fs::symlink;
use std::path::Path;
use std::sync::Arc;

use cinesync_config::LinksConfig;
use cinesync_core::{
    Auditor, BatchWriter, MemoryStore, RecordStore, SymlinkManager, WriterConfig,
};

/// Give `link` a modification time well before any sweep.
fn backdate(link: &Path) {
    let past = filetime::FileTime::from_unix_time(1_600_000_000, 0);
    filetime::set_symlink_file_times(link, past, past).unwrap();
}

fn writer(store: &Arc<MemoryStore>) -> Arc<BatchWriter> {
    Arc::new(BatchWriter::spawn(
        Arc::clone(store) as Arc<dyn RecordStore>,
        WriterConfig::default(),
    ))
}

#[tokio::test]
async fn purge_only_touches_links_unchanged_since_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let library = dir.path().join("library");
    let shows = library.join("Shows/Dark (2017)/Season 01");
    std::fs::create_dir_all(&shows).unwrap();

    let dangling = shows.join("Dark - S01E01.mkv");
    let repaired = shows.join("Dark - S01E02.mkv");
    symlink(dir.path().join("gone/e1.mkv"), &dangling).unwrap();
    symlink(dir.path().join("gone/e2.mkv"), &repaired).unwrap();
    backdate(&dangling);
    backdate(&repaired);

    let store = Arc::new(MemoryStore::new());
    let writer = writer(&store);
    let links = Arc::new(SymlinkManager::new(&library, &LinksConfig::default()));
    let auditor = Auditor::new(Arc::clone(&links), Some(Arc::clone(&writer)));

    let entries = auditor.sweep(std::slice::from_ref(&library)).await;
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.sweep_id == entries[0].sweep_id));

    // between sweep and purge the second link is pointed at a real file
    let real = dir.path().join("e2.mkv");
    std::fs::write(&real, b"video").unwrap();
    std::fs::remove_file(&repaired).unwrap();
    symlink(&real, &repaired).unwrap();

    let report = auditor.purge(&entries).await;
    assert_eq!(report.purged, vec![dangling.clone()]);
    assert_eq!(report.spared, vec![repaired.clone()]);
    assert!(std::fs::symlink_metadata(&dangling).is_err());
    assert_eq!(std::fs::read_link(&repaired).unwrap(), real);

    writer.flush().await;
    let log = store.audit_log(10).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].link_path, dangling);
}

#[tokio::test]
async fn purge_prunes_emptied_folders() {
    let dir = tempfile::tempdir().unwrap();
    let library = dir.path().join("library");
    let folder = library.join("Movies/Heat (1995)");
    std::fs::create_dir_all(&folder).unwrap();
    let link = folder.join("Heat (1995).mkv");
    symlink(dir.path().join("missing.mkv"), &link).unwrap();
    backdate(&link);

    let links = Arc::new(SymlinkManager::new(&library, &LinksConfig::default()));
    let auditor = Auditor::new(links, None);

    let entries = auditor.sweep(std::slice::from_ref(&library)).await;
    let report = auditor.purge(&entries).await;

    assert_eq!(report.purged, vec![link]);
    assert!(!library.join("Movies").exists());
    assert!(library.exists());
}

#[tokio::test]
async fn link_created_during_sweep_window_is_spared() {
    let dir = tempfile::tempdir().unwrap();
    let library = dir.path().join("library");
    std::fs::create_dir_all(&library).unwrap();
    let fresh = library.join("Fresh (2024).mkv");
    symlink(dir.path().join("not-yet.mkv"), &fresh).unwrap();

    let links = Arc::new(SymlinkManager::new(&library, &LinksConfig::default()));
    let auditor = Auditor::new(links, None);

    assert!(auditor.sweep(std::slice::from_ref(&library)).await.is_empty());
    assert!(std::fs::symlink_metadata(&fresh).is_ok());
}
