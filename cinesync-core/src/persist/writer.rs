//! Batched, throttled write path in front of a [`RecordStore`].

use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use cinesync_config::PersistenceConfig;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{PersistenceError, RecordStore, Result, WriteOp};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub batch_size: usize,
    pub max_ops_per_second: u32,
    pub flush_workers: usize,
    pub flush_interval: Duration,
    pub write_retries: u32,
    pub write_retry_delay: Duration,
}

impl From<&PersistenceConfig> for WriterConfig {
    fn from(cfg: &PersistenceConfig) -> Self {
        Self {
            batch_size: cfg.batch_size.max(1),
            max_ops_per_second: cfg.max_ops_per_second.max(1),
            flush_workers: cfg.flush_workers.max(1),
            flush_interval: Duration::from_millis(cfg.flush_interval_ms.max(1)),
            write_retries: cfg.write_retries,
            write_retry_delay: Duration::from_millis(cfg.write_retry_delay_ms),
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::from(&PersistenceConfig::default())
    }
}

/// Counters describing what the writer has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub submitted: u64,
    pub written: u64,
    pub coalesced: u64,
    pub dropped: u64,
    pub batches: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    written: AtomicU64,
    coalesced: AtomicU64,
    dropped: AtomicU64,
    batches: AtomicU64,
    /// Submitted ops not yet written or dropped.
    pending: AtomicUsize,
    idle: Notify,
}

impl Counters {
    fn settle(&self, submitted: usize) {
        let before = self.pending.fetch_sub(submitted, Ordering::AcqRel);
        if before == submitted {
            self.idle.notify_waiters();
        }
    }
}

enum Message {
    Op(WriteOp),
    Flush,
    Shutdown,
}

/// Writes bound for one flush worker. Every op for a given key lands on
/// the same worker, which applies its batches strictly in order.
struct Batch {
    ops: Vec<WriteOp>,
}

pub struct BatchWriter {
    tx: mpsc::UnboundedSender<Message>,
    counters: Arc<Counters>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    config: WriterConfig,
}

impl fmt::Debug for BatchWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchWriter")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl BatchWriter {
    /// Spawn the collector and flush workers on the current runtime.
    pub fn spawn(store: Arc<dyn RecordStore>, config: WriterConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        let burst = NonZeroU32::new(config.max_ops_per_second.max(1))
            .unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(burst)));

        let workers = config.flush_workers.max(1);
        let mut tasks = Vec::with_capacity(workers + 1);
        let mut shards = Vec::with_capacity(workers);
        for worker in 0..workers {
            let (batch_tx, batch_rx) = mpsc::channel::<Batch>(2);
            shards.push(batch_tx);
            tasks.push(tokio::spawn(flush_worker(
                worker,
                batch_rx,
                Arc::clone(&store),
                Arc::clone(&limiter),
                config.clone(),
                Arc::clone(&counters),
            )));
        }
        tasks.push(tokio::spawn(collect(
            rx,
            shards,
            config.clone(),
            Arc::clone(&counters),
        )));

        Self {
            tx,
            counters,
            tasks: Mutex::new(tasks),
            config,
        }
    }

    /// Queue `op`. Never waits on the database.
    pub fn submit(&self, op: WriteOp) -> Result<()> {
        self.counters.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(Message::Op(op)).is_err() {
            self.counters.settle(1);
            return Err(PersistenceError::Closed);
        }
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn submit_all(&self, ops: impl IntoIterator<Item = WriteOp>) -> Result<()> {
        for op in ops {
            self.submit(op)?;
        }
        Ok(())
    }

    /// Wait until every op submitted so far has been written or dropped.
    pub async fn flush(&self) {
        loop {
            let idle = self.counters.idle.notified();
            if self.counters.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            let _ = self.tx.send(Message::Flush);
            idle.await;
        }
    }

    /// Flush everything and stop the background tasks.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Message::Shutdown);
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(target: "cinesync::persist", error = %e, "writer task ended abnormally");
            }
        }
    }

    pub fn stats(&self) -> WriterStats {
        let c = &self.counters;
        WriterStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            written: c.written.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            batches: c.batches.load(Ordering::Relaxed),
        }
    }
}

async fn collect(
    mut rx: mpsc::UnboundedReceiver<Message>,
    shards: Vec<mpsc::Sender<Batch>>,
    config: WriterConfig,
    counters: Arc<Counters>,
) {
    let mut buffer: Vec<WriteOp> = Vec::with_capacity(config.batch_size);
    let mut ticker = tokio::time::interval(config.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(Message::Op(op)) => {
                    buffer.push(op);
                    if buffer.len() >= config.batch_size {
                        dispatch(&mut buffer, &shards, &counters).await;
                    }
                }
                Some(Message::Flush) => dispatch(&mut buffer, &shards, &counters).await,
                Some(Message::Shutdown) | None => {
                    // take whatever raced in behind the shutdown request
                    while let Ok(Message::Op(op)) = rx.try_recv() {
                        buffer.push(op);
                    }
                    dispatch(&mut buffer, &shards, &counters).await;
                    break;
                }
            },
            _ = ticker.tick() => dispatch(&mut buffer, &shards, &counters).await,
        }
    }
}

async fn dispatch(
    buffer: &mut Vec<WriteOp>,
    shards: &[mpsc::Sender<Batch>],
    counters: &Counters,
) {
    if buffer.is_empty() || shards.is_empty() {
        return;
    }
    let submitted = buffer.len();
    let ops = coalesce(std::mem::take(buffer));
    let superseded = submitted - ops.len();
    if superseded > 0 {
        counters
            .coalesced
            .fetch_add(superseded as u64, Ordering::Relaxed);
        counters.settle(superseded);
    }

    let mut parts: Vec<Vec<WriteOp>> = (0..shards.len()).map(|_| Vec::new()).collect();
    for op in ops {
        parts[shard_for(&op, shards.len())].push(op);
    }
    for (shard, ops) in shards.iter().zip(parts) {
        if ops.is_empty() {
            continue;
        }
        let count = ops.len();
        if shard.send(Batch { ops }).await.is_err() {
            error!(target: "cinesync::persist", ops = count, "flush worker gone; dropping batch");
            counters.dropped.fetch_add(count as u64, Ordering::Relaxed);
            counters.settle(count);
        }
    }
}

/// Flush worker owning `op`'s key. Keyless ops (audit appends) go to the
/// first worker.
fn shard_for(op: &WriteOp, shards: usize) -> usize {
    match op.key() {
        Some(key) if shards > 1 => {
            let mut hasher = DefaultHasher::new();
            key.hash(&mut hasher);
            (hasher.finish() % shards as u64) as usize
        }
        _ => 0,
    }
}

/// Keep only the last write per key, preserving the relative order of
/// the survivors.
fn coalesce(ops: Vec<WriteOp>) -> Vec<WriteOp> {
    let mut seen: HashSet<(u8, PathBuf)> = HashSet::new();
    let mut out = Vec::with_capacity(ops.len());
    for op in ops.into_iter().rev() {
        let key = op.key().map(|(table, path)| (table, path.to_path_buf()));
        match key {
            Some(ref key) if !seen.insert(key.clone()) => {}
            _ => out.push(op),
        }
    }
    out.reverse();
    out
}

async fn flush_worker(
    worker: usize,
    mut batches: mpsc::Receiver<Batch>,
    store: Arc<dyn RecordStore>,
    limiter: Arc<Limiter>,
    config: WriterConfig,
    counters: Arc<Counters>,
) {
    loop {
        let Some(batch) = batches.recv().await else {
            break;
        };

        throttle(&limiter, batch.ops.len()).await;

        let mut attempt = 0u32;
        loop {
            match store.apply(&batch.ops).await {
                Ok(()) => {
                    counters
                        .written
                        .fetch_add(batch.ops.len() as u64, Ordering::Relaxed);
                    counters.batches.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        target: "cinesync::persist",
                        worker,
                        ops = batch.ops.len(),
                        "batch written"
                    );
                    break;
                }
                Err(e) if attempt < config.write_retries => {
                    attempt += 1;
                    warn!(
                        target: "cinesync::persist",
                        worker,
                        attempt,
                        error = %e,
                        "batch write failed; retrying"
                    );
                    tokio::time::sleep(config.write_retry_delay).await;
                }
                Err(e) => {
                    error!(
                        target: "cinesync::persist",
                        worker,
                        ops = batch.ops.len(),
                        error = %e,
                        "batch write failed; dropping"
                    );
                    counters
                        .dropped
                        .fetch_add(batch.ops.len() as u64, Ordering::Relaxed);
                    break;
                }
            }
        }
        counters.settle(batch.ops.len());
    }
}

async fn throttle(limiter: &Limiter, ops: usize) {
    let Some(n) = u32::try_from(ops).ok().and_then(NonZeroU32::new) else {
        return;
    };
    if limiter.until_n_ready(n).await.is_err() {
        // batch larger than the burst; pay for it one op at a time
        for _ in 0..ops {
            limiter.until_ready().await;
        }
    }
}
