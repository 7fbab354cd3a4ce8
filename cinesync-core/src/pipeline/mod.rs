//! Processing coordinator.
//!
//! Drives every source file through
//! `Discovered → Parsed → PendingResolve → Resolved → Linking → Linked`,
//! parking it in `AwaitingDisambiguation` or a `Linking` conflict when the
//! operator has to decide. A bounded pool of workers drains an unbounded
//! job queue fed by the initial scan, the monitor, retry timers and
//! operator actions.

pub mod decisions;
pub mod state;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cinesync_config::{Config, RetryConfig};
use cinesync_model::{
    DecisionKind, DestinationPath, ErrorKind, MediaKind, OperatorDecision,
    ParsedIdentity, PendingDecision, ProcessingRecord, ProcessingStage,
    RecordError, ResolvedMedia,
};
use dashmap::DashSet;
use futures::future::join_all;
use tokio::fs;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{CoreError, Result};
use crate::layout::{PathBuilder, sanitize};
use crate::link::{LinkOutcome, SkipReason, SymlinkManager};
use crate::monitor::{MonitorEvent, PathFilter};
use crate::parse::NameParser;
use crate::persist::{BatchWriter, RecordStore, WriteOp};
use crate::resolve::{CacheKey, ResolveError, ResolveOutcome, Resolver};
use crate::retry::Backoff;
use crate::scan::walk_videos;

pub use decisions::{DecisionObserver, DecisionRegistry, NoopDecisionObserver};
pub use state::{RecordTable, allowed};

/// Where a processing request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Scan,
    Monitor,
    Retry,
    Operator,
    /// Re-queued at startup from a persisted non-terminal record.
    Recovery,
}

/// What one processing pass did with a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Linked(PathBuf),
    /// The link already existed; nothing changed.
    AlreadyLinked(PathBuf),
    AwaitingDecision,
    RetryScheduled { attempt: u32, delay: Duration },
    Skipped(ErrorKind),
    Failed(ErrorKind),
    Removed,
    Cancelled,
}

/// Collaborators the coordinator drives.
pub struct CoordinatorParts {
    pub parser: NameParser,
    pub resolver: Arc<Resolver>,
    pub paths: PathBuilder,
    pub links: Arc<SymlinkManager>,
    pub writer: Arc<BatchWriter>,
    pub observer: Arc<dyn DecisionObserver>,
}

impl fmt::Debug for CoordinatorParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatorParts")
            .field("resolver", &self.resolver)
            .field("paths", &self.paths)
            .field("links", &self.links)
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Activity {
    count: AtomicUsize,
    idle: Notify,
}

impl Activity {
    fn enter(self: &Arc<Self>) -> ActivityGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        ActivityGuard(Arc::clone(self))
    }

    async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            idle.await;
        }
    }
}

/// Keeps the coordinator busy while alive.
struct ActivityGuard(Arc<Activity>);

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

enum JobKind {
    Process { path: PathBuf, origin: Origin },
    Remove(PathBuf),
    Rescan(PathBuf),
}

struct Job {
    kind: JobKind,
    _activity: ActivityGuard,
}

struct Inner {
    parser: NameParser,
    resolver: Arc<Resolver>,
    builder: PathBuilder,
    links: Arc<SymlinkManager>,
    writer: Arc<BatchWriter>,
    observer: Arc<dyn DecisionObserver>,
    records: RecordTable,
    decisions: DecisionRegistry,
    filter: PathFilter,
    source_roots: Vec<PathBuf>,
    retry: RetryConfig,
    backoff: Backoff,
    queue: mpsc::UnboundedSender<Job>,
    /// Paths queued or being processed.
    queued: DashSet<PathBuf>,
    activity: Arc<Activity>,
    shutdown: CancellationToken,
}

pub struct Coordinator {
    inner: Arc<Inner>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let worker_count = self
            .workers
            .try_lock()
            .map(|handles| handles.len())
            .unwrap_or_default();
        f.debug_struct("Coordinator")
            .field("records", &self.inner.records)
            .field("decisions", &self.inner.decisions)
            .field("queued", &self.inner.queued.len())
            .field("worker_count", &worker_count)
            .field("shutdown_cancelled", &self.inner.shutdown.is_cancelled())
            .finish()
    }
}

impl Coordinator {
    pub fn new(config: &Config, parts: CoordinatorParts) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        let inner = Inner {
            parser: parts.parser,
            resolver: parts.resolver,
            builder: parts.paths,
            links: parts.links,
            writer: parts.writer,
            observer: parts.observer,
            records: RecordTable::new(),
            decisions: DecisionRegistry::new(),
            filter: PathFilter::new(config.paths.clone()),
            source_roots: config.paths.source_dirs.clone(),
            retry: config.workers.retry,
            backoff: Backoff::for_passes(&config.workers.retry),
            queue,
            queued: DashSet::new(),
            activity: Arc::new(Activity::default()),
            shutdown: CancellationToken::new(),
        };
        Self {
            inner: Arc::new(inner),
            receiver: Arc::new(Mutex::new(receiver)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Seed records and the link index from the store and re-queue every
    /// record that was mid-flight. Returns the number of records loaded.
    pub async fn restore(&self, store: &dyn RecordStore) -> Result<usize> {
        let records = store.load_records(None).await?;
        let links = store.load_links().await?;
        let link_count = self.inner.links.index().rebuild(links);
        let record_count = records.len();

        let unfinished: Vec<PathBuf> = records
            .iter()
            .filter(|record| !record.stage.is_terminal())
            .map(|record| record.source_path.clone())
            .collect();
        self.inner.records.load(records).await;
        for path in &unfinished {
            self.inner.enqueue(path.clone(), Origin::Recovery).await;
        }

        info!(
            target: "cinesync::pipeline",
            records = record_count,
            links = link_count,
            requeued = unfinished.len(),
            "state restored"
        );
        Ok(record_count)
    }

    /// Spawn `workers` pipeline workers.
    pub async fn start(&self, workers: usize) {
        let mut handles = self.workers.lock().await;
        for id in 0..workers.max(1) {
            handles.push(tokio::spawn(worker_loop(
                id,
                Arc::clone(&self.inner),
                Arc::clone(&self.receiver),
            )));
        }
        info!(target: "cinesync::pipeline", workers = handles.len(), "pipeline started");
    }

    /// Walk every source root, queue each video file and drop records whose
    /// file disappeared while we were not watching.
    pub async fn initial_scan(&self) -> usize {
        let mut queued = 0;
        for root in &self.inner.source_roots {
            let found = walk_videos(root, &self.inner.filter).await;
            for path in &found {
                if self.inner.enqueue(path.clone(), Origin::Scan).await {
                    queued += 1;
                }
            }
            for record in self.inner.records.under(root).await {
                if found.binary_search(&record.source_path).is_err() {
                    self.inner
                        .submit(JobKind::Remove(record.source_path.clone()));
                }
            }
        }
        info!(target: "cinesync::pipeline", queued, "initial scan queued");
        queued
    }

    pub async fn enqueue(&self, path: PathBuf, origin: Origin) -> bool {
        self.inner.enqueue(path, origin).await
    }

    pub async fn handle_event(&self, event: MonitorEvent) {
        self.inner.handle_event(event).await;
    }

    /// Feed monitor events into the queue until the stream ends or the
    /// coordinator shuts down.
    pub async fn run_monitor<S>(&self, mut events: S)
    where
        S: Stream<Item = MonitorEvent> + Unpin,
    {
        loop {
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                event = events.next() => match event {
                    Some(event) => self.inner.handle_event(event).await,
                    None => break,
                },
            }
        }
        debug!(target: "cinesync::pipeline", "monitor intake stopped");
    }

    /// Run one processing pass for `path` on the calling task.
    pub async fn process_path(&self, path: &Path) -> ProcessOutcome {
        self.inner.process(path).await
    }

    pub async fn record(&self, path: &Path) -> Option<ProcessingRecord> {
        self.inner.records.get(path).await
    }

    pub fn records(&self) -> &RecordTable {
        &self.inner.records
    }

    pub async fn pending_decisions(&self) -> Vec<PendingDecision> {
        self.inner.decisions.list().await
    }

    /// Records that ended in `Failed`, including ones that exhausted their
    /// retries.
    pub async fn failed_records(&self) -> Vec<ProcessingRecord> {
        self.inner
            .records
            .filter(|record| record.stage == ProcessingStage::Failed)
            .await
    }

    /// Answer the pending decision for `path`.
    pub async fn submit_decision(
        &self,
        path: &Path,
        decision: OperatorDecision,
    ) -> Result<ProcessOutcome> {
        self.inner.submit_decision(path, decision).await
    }

    /// Force `path` back through the pipeline from `Discovered`, dropping
    /// any previous resolution.
    pub async fn reprocess(&self, path: &Path) -> Result<()> {
        self.inner.reprocess(path).await
    }

    /// Wait until the queue is drained, no retry is pending and every write
    /// reached the store.
    pub async fn wait_idle(&self) {
        self.inner.activity.wait_idle().await;
        self.inner.writer.flush().await;
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Cancel retries and stop the workers once their current job is done.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(target: "cinesync::pipeline", error = %e, "worker ended abnormally");
            }
        }
        self.inner.writer.flush().await;
        info!(target: "cinesync::pipeline", "pipeline stopped");
    }
}

async fn worker_loop(
    id: usize,
    inner: Arc<Inner>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
) {
    loop {
        let job = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job) = job else {
            break;
        };
        inner.run(id, job).await;
    }
    debug!(target: "cinesync::pipeline", worker = id, "worker stopped");
}

impl Inner {
    fn submit(&self, kind: JobKind) {
        let job = Job {
            kind,
            _activity: self.activity.enter(),
        };
        if self.queue.send(job).is_err() {
            warn!(target: "cinesync::pipeline", "job queue closed");
        }
    }

    async fn enqueue(&self, path: PathBuf, origin: Origin) -> bool {
        if self.queued.contains(&path) {
            debug!(target: "cinesync::pipeline", path = %path.display(), ?origin, "coalesced");
            return false;
        }

        if let Some(stage) = self.records.stage(&path).await {
            let coalesce = match origin {
                Origin::Scan => matches!(
                    stage,
                    ProcessingStage::Failed | ProcessingStage::Skipped
                ) || !stage.is_terminal(),
                Origin::Monitor => !stage.is_terminal(),
                Origin::Retry => stage != ProcessingStage::PendingResolve,
                Origin::Operator | Origin::Recovery => false,
            };
            if coalesce {
                debug!(
                    target: "cinesync::pipeline",
                    path = %path.display(),
                    %stage,
                    ?origin,
                    "not requeued"
                );
                return false;
            }
        }

        if !self.queued.insert(path.clone()) {
            return false;
        }
        self.submit(JobKind::Process { path, origin });
        true
    }

    async fn handle_event(&self, event: MonitorEvent) {
        match event {
            MonitorEvent::Changed(path) => {
                self.enqueue(path, Origin::Monitor).await;
            }
            MonitorEvent::Removed(path) => self.submit(JobKind::Remove(path)),
            MonitorEvent::Rescan(path) => self.submit(JobKind::Rescan(path)),
        }
    }

    async fn run(self: &Arc<Self>, worker: usize, job: Job) {
        match &job.kind {
            JobKind::Process { path, origin } => {
                debug!(target: "cinesync::pipeline", worker, path = %path.display(), ?origin, "processing");
                let outcome = self.process(path).await;
                self.queued.remove(path);
                debug!(target: "cinesync::pipeline", worker, path = %path.display(), ?outcome, "processed");
            }
            JobKind::Remove(path) => self.remove(path).await,
            JobKind::Rescan(path) => self.rescan(path).await,
        }
    }

    async fn process(self: &Arc<Self>, path: &Path) -> ProcessOutcome {
        let prior = self.records.get(path).await;
        let mut record = match prior.clone() {
            Some(mut record) if record.is_tombstone() => {
                // reuse the tombstone so created_at survives a re-add
                record.retry_count = 0;
                record.last_error = None;
                record.resolved = None;
                record.link_path = None;
                record
            }
            Some(mut record) => {
                if record.stage.is_terminal() {
                    record.retry_count = 0;
                    record.last_error = None;
                }
                record
            }
            None => ProcessingRecord::discovered(path),
        };
        record.advance(ProcessingStage::Discovered);

        let identity = match self.parser.parse(&self.source_relative(path)) {
            Ok(identity) => identity,
            Err(failure) => {
                info!(target: "cinesync::pipeline", path = %path.display(), reason = %failure, "not linkable");
                record.last_error = Some(RecordError::new(ErrorKind::ParseFailure, failure.to_string()));
                self.transition(&mut record, ProcessingStage::Skipped);
                self.save(&record).await;
                return ProcessOutcome::Skipped(ErrorKind::ParseFailure);
            }
        };
        record.identity = Some(identity.clone());
        self.transition(&mut record, ProcessingStage::Parsed);

        if self.shutdown.is_cancelled() {
            return ProcessOutcome::Cancelled;
        }

        let reusable = prior.as_ref().and_then(|prior| {
            let same = prior
                .identity
                .as_ref()
                .is_some_and(|previous| previous.same_media(&identity));
            if same { prior.resolved.clone() } else { None }
        });

        self.transition(&mut record, ProcessingStage::PendingResolve);
        let media = match reusable {
            Some(media) => {
                self.transition(&mut record, ProcessingStage::Resolved);
                media
            }
            None => {
                match self.resolve(&mut record, &identity).await {
                    Ok(media) => media,
                    Err(outcome) => return outcome,
                }
            }
        };

        if self.shutdown.is_cancelled() {
            return ProcessOutcome::Cancelled;
        }

        record.resolved = Some(media.clone());
        self.link(record, prior.as_ref(), &media, &identity, None, false)
            .await
    }

    /// Resolution stage. `Err` carries the outcome of a pass that stopped
    /// here; the record has already been saved.
    async fn resolve(
        self: &Arc<Self>,
        record: &mut ProcessingRecord,
        identity: &ParsedIdentity,
    ) -> std::result::Result<ResolvedMedia, ProcessOutcome> {
        let path = record.source_path.clone();
        match self.resolver.resolve(identity, identity.kind_hint()).await {
            Ok(ResolveOutcome::Resolved(media)) => {
                record.retry_count = 0;
                record.last_error = None;
                self.transition(record, ProcessingStage::Resolved);
                Ok(media)
            }
            Ok(ResolveOutcome::Ambiguous(candidates)) => {
                record.last_error = Some(RecordError::new(
                    ErrorKind::AmbiguousMatch,
                    format!("{} plausible matches", candidates.len()),
                ));
                self.transition(record, ProcessingStage::AwaitingDisambiguation);
                self.save(record).await;
                self.park(&path, DecisionKind::Disambiguation { candidates })
                    .await;
                Err(ProcessOutcome::AwaitingDecision)
            }
            Ok(ResolveOutcome::NotFound) => {
                record.last_error = Some(RecordError::new(
                    ErrorKind::NotFound,
                    format!("no match for \"{}\"", identity.title),
                ));
                self.transition(record, ProcessingStage::Failed);
                self.save(record).await;
                Err(ProcessOutcome::Failed(ErrorKind::NotFound))
            }
            Err(ResolveError::Closed) => Err(ProcessOutcome::Cancelled),
            Err(e) if e.is_recoverable() => {
                record.retry_count += 1;
                record.last_error = Some(RecordError::new(ErrorKind::ResolverTransient, e.to_string()));
                if record.retry_count >= self.retry.max_resolve_retries {
                    warn!(
                        target: "cinesync::pipeline",
                        path = %path.display(),
                        attempts = record.retry_count,
                        error = %e,
                        "resolution retries exhausted"
                    );
                    self.transition(record, ProcessingStage::Failed);
                    self.save(record).await;
                    return Err(ProcessOutcome::Failed(ErrorKind::ResolverTransient));
                }
                self.transition(record, ProcessingStage::PendingResolve);
                self.save(record).await;
                let attempt = record.retry_count;
                let delay = self.schedule_retry(path, attempt);
                Err(ProcessOutcome::RetryScheduled { attempt, delay })
            }
            Err(e) => {
                error!(target: "cinesync::pipeline", path = %path.display(), error = %e, "provider rejected lookup");
                record.last_error = Some(RecordError::new(ErrorKind::ProviderRejected, e.to_string()));
                self.transition(record, ProcessingStage::Failed);
                self.save(record).await;
                Err(ProcessOutcome::Failed(ErrorKind::ProviderRejected))
            }
        }
    }

    /// Linking stage.
    async fn link(
        self: &Arc<Self>,
        mut record: ProcessingRecord,
        prior: Option<&ProcessingRecord>,
        media: &ResolvedMedia,
        identity: &ParsedIdentity,
        destination: Option<DestinationPath>,
        force: bool,
    ) -> ProcessOutcome {
        let path = record.source_path.clone();
        let destination = destination.unwrap_or_else(|| {
            self.builder
                .build(media, identity, &self.source_relative(&path))
        });
        self.transition(&mut record, ProcessingStage::Linking);

        let result = if force {
            self.links.force_link(&path, &destination).await
        } else {
            self.links.ensure_link(&path, &destination).await
        };

        match result {
            Ok(LinkOutcome::Linked { record: link, replaced }) => {
                record.link_path = Some(link.link_path.clone());
                record.last_error = None;
                self.transition(&mut record, ProcessingStage::Linked);
                self.save(&record).await;
                let mut ops = vec![WriteOp::UpsertLink(link.clone())];
                ops.extend(replaced.map(WriteOp::DeleteLink));
                self.write(ops);
                ProcessOutcome::Linked(link.link_path)
            }
            Ok(LinkOutcome::Skipped {
                link_path,
                reason: SkipReason::AlreadyLinked,
            }) => {
                let unchanged = prior.is_some_and(|prior| {
                    prior.stage == ProcessingStage::Linked
                        && prior.link_path.as_deref() == Some(link_path.as_path())
                        && prior.identity.as_ref() == Some(identity)
                        && prior.resolved.as_ref() == Some(media)
                });
                if unchanged {
                    debug!(target: "cinesync::pipeline", path = %path.display(), "already linked");
                    return ProcessOutcome::AlreadyLinked(link_path);
                }
                record.link_path = Some(link_path.clone());
                record.last_error = None;
                self.transition(&mut record, ProcessingStage::Linked);
                self.save(&record).await;
                if let Some(link) = self.links.index().record(&link_path) {
                    self.write([WriteOp::UpsertLink(link)]);
                }
                ProcessOutcome::AlreadyLinked(link_path)
            }
            Ok(LinkOutcome::Skipped {
                link_path,
                reason: SkipReason::ConflictSkipped,
            }) => {
                record.last_error = Some(RecordError::new(
                    ErrorKind::LinkConflict,
                    format!("{} is occupied", link_path.display()),
                ));
                self.transition(&mut record, ProcessingStage::Skipped);
                self.save(&record).await;
                ProcessOutcome::Skipped(ErrorKind::LinkConflict)
            }
            Ok(LinkOutcome::Conflict {
                destination,
                existing_target,
            }) => {
                record.last_error = Some(RecordError::new(
                    ErrorKind::LinkConflict,
                    format!("{} is occupied", destination.display()),
                ));
                self.transition(&mut record, ProcessingStage::Linking);
                self.save(&record).await;
                self.park(
                    &path,
                    DecisionKind::Conflict {
                        destination,
                        existing_target,
                    },
                )
                .await;
                ProcessOutcome::AwaitingDecision
            }
            Err(e) => {
                error!(target: "cinesync::pipeline", path = %path.display(), error = %e, "link failed");
                record.last_error = Some(RecordError::new(ErrorKind::Filesystem, e.to_string()));
                self.transition(&mut record, ProcessingStage::Failed);
                self.save(&record).await;
                ProcessOutcome::Failed(ErrorKind::Filesystem)
            }
        }
    }

    async fn submit_decision(
        self: &Arc<Self>,
        path: &Path,
        decision: OperatorDecision,
    ) -> Result<ProcessOutcome> {
        let pending = self.decisions.get(path).await.ok_or_else(|| {
            CoreError::InvalidDecision(format!("no pending decision for {}", path.display()))
        })?;
        let mut record = self
            .records
            .get(path)
            .await
            .ok_or_else(|| CoreError::UnknownRecord(path.display().to_string()))?;
        let identity = record.identity.clone().ok_or_else(|| {
            CoreError::Internal(format!("{} has no parsed identity", path.display()))
        })?;

        info!(target: "cinesync::pipeline", path = %path.display(), ?decision, "operator decision");
        match (pending.kind, decision) {
            (_, OperatorDecision::Skip) => {
                self.decisions.take(path).await;
                self.observer.on_resolved(path);
                self.transition(&mut record, ProcessingStage::Skipped);
                self.save(&record).await;
                let kind = record
                    .last_error
                    .as_ref()
                    .map(|error| error.kind)
                    .unwrap_or(ErrorKind::AmbiguousMatch);
                Ok(ProcessOutcome::Skipped(kind))
            }
            (DecisionKind::Disambiguation { candidates }, OperatorDecision::AcceptCandidate(index)) => {
                let candidate = candidates.get(index).ok_or_else(|| {
                    CoreError::InvalidDecision(format!(
                        "candidate {index} out of range ({} offered)",
                        candidates.len()
                    ))
                })?;
                let outcome = self.resolver.accept_candidate(&identity, candidate).await?;
                Ok(self.apply_resolution(record, identity, outcome).await)
            }
            (DecisionKind::Disambiguation { .. }, OperatorDecision::AcceptExternalId(id)) => {
                let outcome = self.resolver.resolve_id(&id, identity.kind_hint()).await?;
                Ok(self.apply_resolution(record, identity, outcome).await)
            }
            (DecisionKind::Conflict { destination, .. }, OperatorDecision::Overwrite) => {
                let media = self.resolved_media(&record)?;
                self.decisions.take(path).await;
                self.observer.on_resolved(path);
                let destination = self.destination_for(&destination);
                Ok(self
                    .link(record, None, &media, &identity, Some(destination), true)
                    .await)
            }
            (DecisionKind::Conflict { destination, .. }, OperatorDecision::Rename(name)) => {
                let media = self.resolved_media(&record)?;
                let renamed = renamed_destination(&destination, &name);
                self.decisions.take(path).await;
                self.observer.on_resolved(path);
                let destination = self.destination_for(&renamed);
                Ok(self
                    .link(record, None, &media, &identity, Some(destination), false)
                    .await)
            }
            (kind, decision) => Err(CoreError::InvalidDecision(format!(
                "{decision:?} does not answer a {} decision",
                match kind {
                    DecisionKind::Disambiguation { .. } => "disambiguation",
                    DecisionKind::Conflict { .. } => "conflict",
                }
            ))),
        }
    }

    async fn apply_resolution(
        self: &Arc<Self>,
        mut record: ProcessingRecord,
        identity: ParsedIdentity,
        outcome: ResolveOutcome,
    ) -> ProcessOutcome {
        let path = record.source_path.clone();
        self.decisions.take(&path).await;
        self.observer.on_resolved(&path);

        match outcome {
            ResolveOutcome::Resolved(media) => {
                record.retry_count = 0;
                record.last_error = None;
                record.resolved = Some(media.clone());
                self.transition(&mut record, ProcessingStage::Resolved);
                self.link(record, None, &media, &identity, None, false).await
            }
            ResolveOutcome::Ambiguous(candidates) => {
                self.save(&record).await;
                self.park(&path, DecisionKind::Disambiguation { candidates })
                    .await;
                ProcessOutcome::AwaitingDecision
            }
            ResolveOutcome::NotFound => {
                record.last_error = Some(RecordError::new(
                    ErrorKind::NotFound,
                    "operator choice is unknown to the provider",
                ));
                self.transition(&mut record, ProcessingStage::Failed);
                self.save(&record).await;
                ProcessOutcome::Failed(ErrorKind::NotFound)
            }
        }
    }

    async fn reprocess(self: &Arc<Self>, path: &Path) -> Result<()> {
        let mut record = self
            .records
            .get(path)
            .await
            .ok_or_else(|| CoreError::UnknownRecord(path.display().to_string()))?;
        if record.is_tombstone() {
            return Err(CoreError::InvalidDecision(format!(
                "{} no longer exists",
                path.display()
            )));
        }

        if self.decisions.take(path).await.is_some() {
            self.observer.on_resolved(path);
        }
        if let Some(identity) = &record.identity {
            let kind: MediaKind = identity.kind_hint();
            self.resolver
                .cache()
                .invalidate(&CacheKey::title(kind, &identity.title, identity.year))
                .await;
        }

        record.resolved = None;
        record.retry_count = 0;
        record.last_error = None;
        record.advance(ProcessingStage::Discovered);
        self.save(&record).await;

        info!(target: "cinesync::pipeline", path = %path.display(), "reprocessing forced");
        self.enqueue(path.to_path_buf(), Origin::Operator).await;
        Ok(())
    }

    /// Handle a removal notification for a file or a whole folder.
    async fn remove(self: &Arc<Self>, path: &Path) {
        if let Ok(meta) = fs::symlink_metadata(path).await {
            // it came back before we got to it
            if meta.is_dir() {
                self.rescan(path).await;
            } else {
                self.enqueue(path.to_path_buf(), Origin::Monitor).await;
            }
            return;
        }

        for mut record in self.records.under(path).await {
            let source = record.source_path.clone();
            match self.links.remove_for_source(&source).await {
                Ok(Some(link)) => self.write([WriteOp::DeleteLink(link)]),
                Ok(None) => {
                    if let Some(link) = &record.link_path
                        && self.links.forget(link).is_some()
                    {
                        self.write([WriteOp::DeleteLink(link.clone())]);
                    }
                }
                Err(e) => {
                    warn!(target: "cinesync::pipeline", source = %source.display(), error = %e, "failed to remove link");
                }
            }
            if self.decisions.take(&source).await.is_some() {
                self.observer.on_resolved(&source);
            }
            record.link_path = None;
            self.transition(&mut record, ProcessingStage::Removed);
            self.save(&record).await;
            info!(target: "cinesync::pipeline", source = %source.display(), "source removed");
        }
    }

    async fn rescan(self: &Arc<Self>, path: &Path) {
        let found = walk_videos(path, &self.filter).await;
        for file in &found {
            self.enqueue(file.clone(), Origin::Monitor).await;
        }
        for record in self.records.under(path).await {
            if found.binary_search(&record.source_path).is_err()
                && fs::symlink_metadata(&record.source_path).await.is_err()
            {
                self.submit(JobKind::Remove(record.source_path.clone()));
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>, path: PathBuf, attempt: u32) -> Duration {
        let delay = self.backoff.delay(&path, attempt);
        let guard = self.activity.enter();
        let inner = Arc::clone(self);
        debug!(
            target: "cinesync::pipeline",
            path = %path.display(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "retry scheduled"
        );
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    inner.enqueue(path, Origin::Retry).await;
                }
            }
            drop(guard);
        });
        delay
    }

    async fn park(&self, path: &Path, kind: DecisionKind) {
        let decision = PendingDecision::new(path, kind);
        info!(
            target: "cinesync::pipeline",
            path = %path.display(),
            conflict = decision.is_conflict(),
            "awaiting operator decision"
        );
        self.observer.on_pending(&decision);
        self.decisions.insert(decision).await;
    }

    fn transition(&self, record: &mut ProcessingRecord, to: ProcessingStage) {
        let from = record.stage;
        if !allowed(from, to) {
            warn!(
                target: "cinesync::pipeline",
                path = %record.source_path.display(),
                %from,
                %to,
                "unexpected stage transition"
            );
        }
        debug!(target: "cinesync::pipeline", path = %record.source_path.display(), %from, %to, "stage");
        record.advance(to);
    }

    /// Publish `record` to the table, then queue its write.
    async fn save(&self, record: &ProcessingRecord) {
        self.records.put(record.clone()).await;
        self.write([WriteOp::UpsertRecord(record.clone())]);
    }

    fn write(&self, ops: impl IntoIterator<Item = WriteOp>) {
        if let Err(e) = self.writer.submit_all(ops) {
            error!(target: "cinesync::persist", error = %e, "write dropped");
        }
    }

    fn resolved_media(&self, record: &ProcessingRecord) -> Result<ResolvedMedia> {
        record.resolved.clone().ok_or_else(|| {
            CoreError::Internal(format!(
                "{} has no resolution to link",
                record.source_path.display()
            ))
        })
    }

    fn source_relative(&self, path: &Path) -> PathBuf {
        self.source_roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| {
                path.file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| path.to_path_buf())
            })
    }

    fn destination_for(&self, absolute: &Path) -> DestinationPath {
        let root = self.builder.root();
        let relative = absolute
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| absolute.to_path_buf());
        DestinationPath::new(root, relative)
    }
}

/// `destination` with its file name replaced by `name`, keeping the
/// original extension when `name` has none.
fn renamed_destination(destination: &Path, name: &str) -> PathBuf {
    let mut file_name = sanitize(name);
    if Path::new(&file_name).extension().is_none()
        && let Some(ext) = destination.extension()
    {
        file_name = format!("{}.{}", file_name, ext.to_string_lossy());
    }
    destination.with_file_name(file_name)
}
