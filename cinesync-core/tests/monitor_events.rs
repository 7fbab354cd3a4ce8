use std::io::Write;
use std::time::Duration;

use cinesync_config::Config;
use cinesync_core::{Monitor, MonitorEvent};
use tokio::time::timeout;
use tokio_stream::StreamExt;

fn config(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.paths.source_dirs = vec![root.to_path_buf()];
    config.monitor.debounce_ms = 300;
    config
}

/// Collect events until the stream has been quiet for `quiet`.
async fn collect(
    stream: &mut (impl tokio_stream::Stream<Item = MonitorEvent> + Unpin),
    quiet: Duration,
) -> Vec<MonitorEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = timeout(quiet, stream.next()).await {
        events.push(event);
    }
    events
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn burst_of_writes_yields_one_change() {
    let dir = tempfile::tempdir().unwrap();
    let monitor = Monitor::new(&config(dir.path()));
    let mut stream = monitor.start().await.unwrap();

    let path = dir.path().join("Heat.1995.1080p.mkv");
    let mut file = std::fs::File::create(&path).unwrap();
    for _ in 0..10 {
        file.write_all(&[0u8; 4096]).unwrap();
        file.sync_all().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    drop(file);

    let events = collect(&mut stream, Duration::from_secs(2)).await;
    let changes: Vec<_> = events
        .iter()
        .filter(|event| **event == MonitorEvent::Changed(path.clone()))
        .collect();
    assert_eq!(changes.len(), 1, "{events:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ignores_non_video_and_hidden_files() {
    let dir = tempfile::tempdir().unwrap();
    let monitor = Monitor::new(&config(dir.path()));
    let mut stream = monitor.start().await.unwrap();

    std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
    std::fs::write(dir.path().join(".Heat.1995.mkv"), b"x").unwrap();
    let video = dir.path().join("Heat.1995.mkv");
    std::fs::write(&video, b"x").unwrap();

    let events = collect(&mut stream, Duration::from_secs(2)).await;
    assert!(
        events
            .iter()
            .all(|event| event.path() == video.as_path()),
        "{events:?}"
    );
    assert!(events.contains(&MonitorEvent::Changed(video)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removed_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("Heat.1995.mkv");
    std::fs::write(&video, b"x").unwrap();

    let monitor = Monitor::new(&config(dir.path()));
    let mut stream = monitor.start().await.unwrap();
    std::fs::remove_file(&video).unwrap();

    let events = collect(&mut stream, Duration::from_secs(2)).await;
    assert_eq!(events, vec![MonitorEvent::Removed(video)]);
}
