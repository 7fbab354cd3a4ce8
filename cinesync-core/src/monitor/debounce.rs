use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::trace;

use super::MonitorEvent;

/// Per-path quiet-window tracker.
///
/// Every push for a path restarts its window and replaces its pending event,
/// so a burst of notifications collapses into the last one once the path has
/// been quiet for `window`.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, (Instant, MonitorEvent)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn push(&mut self, event: MonitorEvent, now: Instant) {
        let deadline = now + self.window;
        self.pending
            .insert(event.path().to_path_buf(), (deadline, event));
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|(deadline, _)| *deadline).min()
    }

    /// Remove and return events whose window has elapsed, oldest first.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<MonitorEvent> {
        let mut ready: Vec<(Instant, MonitorEvent)> = Vec::new();
        self.pending.retain(|_, (deadline, event)| {
            if *deadline <= now {
                ready.push((*deadline, event.clone()));
                false
            } else {
                true
            }
        });
        ready.sort_by_key(|(deadline, _)| *deadline);
        ready.into_iter().map(|(_, event)| event).collect()
    }

    pub fn drain_all(&mut self) -> Vec<MonitorEvent> {
        self.drain_ready(Instant::now() + self.window)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Run a [`Debouncer`] between two channels until `input` closes. Pending
/// events are flushed when it does.
pub fn spawn_debouncer(
    window: Duration,
    mut input: mpsc::UnboundedReceiver<MonitorEvent>,
    output: mpsc::UnboundedSender<MonitorEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut debouncer = Debouncer::new(window);
        loop {
            let deadline = debouncer.next_deadline();
            tokio::select! {
                msg = input.recv() => match msg {
                    Some(event) => {
                        trace!(target: "cinesync::monitor", ?event, "raw event");
                        debouncer.push(event, Instant::now());
                    }
                    None => {
                        for event in debouncer.drain_all() {
                            if output.send(event).is_err() {
                                return;
                            }
                        }
                        return;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    for event in debouncer.drain_ready(Instant::now()) {
                        if output.send(event).is_err() {
                            return;
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn restarts_window_on_every_push() {
        let window = Duration::from_millis(500);
        let mut debouncer = Debouncer::new(window);
        let start = Instant::now();
        let path = PathBuf::from("/src/a.mkv");

        debouncer.push(MonitorEvent::Changed(path.clone()), start);
        debouncer.push(
            MonitorEvent::Changed(path.clone()),
            start + Duration::from_millis(400),
        );
        assert!(debouncer.drain_ready(start + window).is_empty());

        let ready = debouncer.drain_ready(start + Duration::from_millis(900));
        assert_eq!(ready, vec![MonitorEvent::Changed(path)]);
        assert!(debouncer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn latest_kind_wins() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let now = Instant::now();
        let path = PathBuf::from("/src/a.mkv");
        debouncer.push(MonitorEvent::Changed(path.clone()), now);
        debouncer.push(MonitorEvent::Removed(path.clone()), now);
        assert_eq!(debouncer.drain_all(), vec![MonitorEvent::Removed(path)]);
    }

    #[tokio::test(start_paused = true)]
    async fn channel_debouncer_emits_once_after_quiet_window() {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let task = spawn_debouncer(Duration::from_millis(250), raw_rx, out_tx);

        let path = PathBuf::from("/src/a.mkv");
        for _ in 0..10 {
            raw_tx.send(MonitorEvent::Changed(path.clone())).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(out_rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(out_rx.recv().await, Some(MonitorEvent::Changed(path)));
        assert!(out_rx.try_recv().is_err());

        drop(raw_tx);
        task.await.unwrap();
    }
}
