//! # Resource Cache Controller
//!
//! One controller serves one logical display slot. It owns at most one [`DownloadJob`],
//! the slot's current [`Resolution`] and its connectivity subscription.
//!
//! The controller runs on a single logical thread: callers drive it through `&mut self`,
//! and asynchronous completions come back as [`JobEvent`]s which are applied by
//! [`ResourceCacheController::process_next`]. Events are matched against the job the
//! controller currently tracks; anything else is a stale callback from a superseded or
//! cancelled job and is dropped.
//!
//! Two controllers writing the same cache key at the same time is not supported.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, instrument, trace, warn};

use crate::cache::{CacheEntry, CacheKey, CacheStore};
use crate::connectivity::{ConnectivityMonitor, ConnectivityState, Subscription};
use crate::error::FailureKind;
use crate::job::{
    DownloadJob, JobEvent, JobEventKind, JobHandle, JobId, JobOutcome, JobState,
};
use crate::request::ResourceRequest;
use crate::transport::Transport;

const RESOLUTION_CHANNEL_CAPACITY: usize = 64;

/// What the slot currently has to show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing requested yet, or the last job was cancelled from outside
    Idle,
    /// A job was started and has not received a response yet
    Pending { job: JobId },
    /// The server accepted the request and the body is streaming in
    Downloading {
        job: JobId,
        bytes_written: u64,
        content_length: Option<u64>,
    },
    /// A valid cached file
    Resolved(CacheEntry),
    /// Cache miss while offline; retried when connectivity returns or on the next submit
    Deferred,
    /// No cached file for this request
    Uncacheable(FailureKind),
}

impl Resolution {
    pub fn entry(&self) -> Option<&CacheEntry> {
        match self {
            Self::Resolved(entry) => Some(entry),
            _ => None,
        }
    }

    /// A job is still expected to report back
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending { .. } | Self::Downloading { .. })
    }
}

#[derive(Debug)]
struct ActiveJob {
    job: DownloadJob,
    key: CacheKey,
}

enum Incoming {
    Job(JobEvent),
    Connectivity(ConnectivityState),
}

pub struct ResourceCacheController {
    store: CacheStore,
    transport: Arc<dyn Transport>,
    connectivity: ConnectivityMonitor,
    subscription: Option<Subscription>,
    events_tx: mpsc::UnboundedSender<JobEvent>,
    events_rx: mpsc::UnboundedReceiver<JobEvent>,
    active: Option<ActiveJob>,
    request: Option<ResourceRequest>,
    resolution: Resolution,
    // Last entry handed out; replaced files are deleted through it
    displayed: Option<CacheEntry>,
    notify: broadcast::Sender<Resolution>,
    next_job: u64,
}

impl ResourceCacheController {
    pub fn new(
        store: CacheStore,
        transport: Arc<dyn Transport>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notify, _) = broadcast::channel(RESOLUTION_CHANNEL_CAPACITY);
        let subscription = connectivity.subscribe();

        Self {
            store,
            transport,
            connectivity,
            subscription: Some(subscription),
            events_tx,
            events_rx,
            active: None,
            request: None,
            resolution: Resolution::Idle,
            displayed: None,
            notify,
            next_job: 0,
        }
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn request(&self) -> Option<&ResourceRequest> {
        self.request.as_ref()
    }

    pub fn active_job(&self) -> Option<&JobHandle> {
        self.active.as_ref().map(|active| active.job.handle())
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Follow resolution changes
    pub fn subscribe(&self) -> broadcast::Receiver<Resolution> {
        self.notify.subscribe()
    }

    /// Point the slot at a new resource. Never fails; problems end up in the resolution.
    #[instrument(skip(self, request), fields(uri = %request.uri()))]
    pub async fn submit(&mut self, request: ResourceRequest) {
        // Cancel before the first await so a late event of the old job can never win.
        let superseded = self.active.take();
        if let Some(active) = &superseded {
            active.job.cancel();
        }
        self.request = Some(request.clone());

        if let Some(active) = superseded {
            debug!(job = %active.job.id(), "Superseding in-flight download");
            self.retire(active.job).await;
        }

        self.resolve(request).await;
    }

    // Wait for a cancelled job to stop, then remove whatever it left behind. A job that
    // completed before the cancel has a valid cache file, which stays.
    async fn retire(&self, job: DownloadJob) {
        let handle = job.handle().clone();
        job.join().await;

        if handle.state() == JobState::Completed {
            debug!(job = %handle.id(), path = ?handle.target_path(), "Keeping file of completed job");
        } else {
            self.store.delete(handle.target_path()).await;
        }
    }

    /// Submit and drive the controller until the request settles.
    pub async fn fetch(&mut self, request: ResourceRequest) -> Resolution {
        self.submit(request).await;
        self.settle().await.clone()
    }

    async fn resolve(&mut self, request: ResourceRequest) {
        let namespace = request.namespace().to_string();
        let key = request.cache_key();
        let target = self.store.path_for(&namespace, &key);

        if let Some(entry) = self.store.lookup(&namespace, &key).await {
            debug!(path = ?entry.path, size = entry.size, "Cache hit");
            self.set_resolved(entry);
            return;
        }

        if !self.connectivity.current_state().is_reachable() {
            debug!("Cache miss while offline, deferring download");
            self.transition(Resolution::Deferred);
            return;
        }

        if let Err(e) = self.store.ensure_directory(&namespace).await {
            warn!(namespace = %namespace, error = %e, "Failed to create cache directory");
            self.store.delete(&target).await;
            self.transition(Resolution::Uncacheable(FailureKind::Directory(e.to_string())));
            return;
        }

        if let Some(previous) = self.displayed.take()
            && previous.path != target
        {
            debug!(path = ?previous.path, "Removing previously cached file");
            self.store.delete(&previous.path).await;
        }

        self.next_job += 1;
        let id = JobId::new(self.next_job);
        let job = DownloadJob::start(
            id,
            Arc::clone(&self.transport),
            request,
            target,
            self.events_tx.clone(),
        );

        self.active = Some(ActiveJob { job, key });
        self.transition(Resolution::Pending { job: id });
    }

    /// Wait for the next job or connectivity event and apply it.
    /// Returns `false` once no further event can arrive: no job is in flight and the
    /// connectivity subscription is gone.
    pub async fn process_next(&mut self) -> bool {
        if self.active.is_none() && self.subscription.is_none() {
            return false;
        }

        let events = &mut self.events_rx;
        let subscription = &mut self.subscription;

        let incoming = tokio::select! {
            event = events.recv() => event.map(Incoming::Job),
            state = async {
                match subscription.as_mut() {
                    Some(subscription) => subscription.recv().await,
                    None => std::future::pending().await,
                }
            } => state.map(Incoming::Connectivity),
        };

        match incoming {
            Some(Incoming::Job(event)) => self.apply(event).await,
            Some(Incoming::Connectivity(state)) => self.on_connectivity(state).await,
            None => return false,
        }
        true
    }

    /// Process events until no job is in flight.
    pub async fn settle(&mut self) -> &Resolution {
        while self.active.is_some() {
            if !self.process_next().await {
                break;
            }
        }
        &self.resolution
    }

    async fn apply(&mut self, event: JobEvent) {
        let current = self.active.as_ref().map(|active| active.job.id());
        if current != Some(event.job) {
            trace!(job = %event.job, "Ignoring stale job event");
            return;
        }

        match event.kind {
            JobEventKind::Begin {
                status,
                content_length,
            } => {
                if FailureKind::refusal(status).is_some() {
                    debug!(job = %event.job, %status, "Server refused resource");
                } else {
                    self.transition(Resolution::Downloading {
                        job: event.job,
                        bytes_written: 0,
                        content_length,
                    });
                }
            }
            JobEventKind::Progress {
                bytes_written,
                content_length,
            } => {
                let content_length = match &self.resolution {
                    Resolution::Downloading {
                        content_length: known,
                        ..
                    } => content_length.or(*known),
                    _ => content_length,
                };
                self.transition(Resolution::Downloading {
                    job: event.job,
                    bytes_written,
                    content_length,
                });
            }
            JobEventKind::Finished(outcome) => {
                let Some(ActiveJob { job, key }) = self.active.take() else {
                    return;
                };
                let target = job.handle().target_path().to_path_buf();
                // Completion may have been inferred from the byte count while the
                // transport is still winding down.
                job.detach();
                self.finish(outcome, key, target).await;
            }
        }
    }

    async fn finish(&mut self, outcome: JobOutcome, key: CacheKey, target: PathBuf) {
        match outcome {
            JobOutcome::Completed => match self.store.entry_at(key, target.clone()).await {
                Some(entry) => {
                    info!(path = ?entry.path, size = entry.size, "Resource cached");
                    self.set_resolved(entry);
                }
                None => {
                    self.store.delete(&target).await;
                    self.transition(Resolution::Uncacheable(FailureKind::Transfer(
                        "downloaded file is missing or empty".to_string(),
                    )));
                }
            },
            JobOutcome::Failed(kind) => {
                self.store.delete(&target).await;
                self.transition(Resolution::Uncacheable(kind));
            }
            JobOutcome::Cancelled => {
                self.store.delete(&target).await;
                self.transition(Resolution::Idle);
            }
        }
    }

    async fn on_connectivity(&mut self, state: ConnectivityState) {
        if !state.is_reachable() || self.resolution != Resolution::Deferred {
            return;
        }
        if let Some(request) = self.request.clone() {
            info!(uri = %request.uri(), "Connectivity restored, retrying deferred request");
            self.resolve(request).await;
        }
    }

    fn set_resolved(&mut self, entry: CacheEntry) {
        self.displayed = Some(entry.clone());
        self.transition(Resolution::Resolved(entry));
    }

    fn transition(&mut self, next: Resolution) {
        if self.resolution == next {
            return;
        }
        trace!(from = ?self.resolution, to = ?next, "Resolution changed");
        self.resolution = next.clone();
        // No receivers is fine
        let _ = self.notify.send(next);
    }

    /// Stop listening for connectivity changes and cancel the active job.
    pub async fn teardown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.connectivity.unsubscribe(subscription.id());
        }

        if let Some(ActiveJob { job, .. }) = self.active.take() {
            job.cancel();
            self.retire(job).await;
        }
    }
}

impl Drop for ResourceCacheController {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.connectivity.unsubscribe(subscription.id());
        }
        // The task removes its own partial file once it observes the cancellation.
        if let Some(active) = self.active.take() {
            active.job.cancel();
        }
    }
}
