//! # Download Jobs
//!
//! A [`DownloadJob`] is one fetch-to-file transfer running on its own task. The task and
//! its owner share a small progress record; every transition goes through it and terminal
//! states are absorbing, so the first terminal signal wins no matter whether it came from
//! the transport's final status, the byte-count fallback in [`TransferSink::progress`] or
//! [`JobHandle::cancel`].
//!
//! Outcomes are reported to the owner as [`JobEvent`]s over an unbounded channel. Failed
//! and cancelled jobs delete their target file before the event is sent.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::cache::remove_file_best_effort;
use crate::error::FailureKind;
use crate::request::ResourceRequest;
use crate::transport::Transport;

// How long a cancelled transport may take to wind down before it is dropped
const CANCEL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    InProgress,
    Completed,
    Failed(FailureKind),
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::Cancelled)
    }
}

/// Terminal result of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(FailureKind),
    Cancelled,
}

impl JobOutcome {
    fn from_state(state: &JobState) -> Option<Self> {
        match state {
            JobState::Completed => Some(Self::Completed),
            JobState::Failed(kind) => Some(Self::Failed(kind.clone())),
            JobState::Cancelled => Some(Self::Cancelled),
            JobState::Pending | JobState::InProgress => None,
        }
    }

    fn into_state(self) -> JobState {
        match self {
            Self::Completed => JobState::Completed,
            Self::Failed(kind) => JobState::Failed(kind),
            Self::Cancelled => JobState::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEventKind {
    Begin {
        status: StatusCode,
        content_length: Option<u64>,
    },
    Progress {
        bytes_written: u64,
        content_length: Option<u64>,
    },
    Finished(JobOutcome),
}

/// Event emitted by a job task, tagged with the job it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub job: JobId,
    pub kind: JobEventKind,
}

#[derive(Debug)]
struct JobProgress {
    state: JobState,
    bytes_written: u64,
    content_length: Option<u64>,
    // Set once the terminal event has been sent
    reported: bool,
}

/// Cloneable view of a job: state inspection and cancellation
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    target: Arc<PathBuf>,
    progress: Arc<Mutex<JobProgress>>,
    token: CancellationToken,
}

impl JobHandle {
    fn new(id: JobId, target: PathBuf) -> Self {
        Self {
            id,
            target: Arc::new(target),
            progress: Arc::new(Mutex::new(JobProgress {
                state: JobState::Pending,
                bytes_written: 0,
                content_length: None,
                reported: false,
            })),
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn target_path(&self) -> &Path {
        &self.target
    }

    pub fn state(&self) -> JobState {
        self.progress.lock().state.clone()
    }

    pub fn bytes_written(&self) -> u64 {
        self.progress.lock().bytes_written
    }

    pub fn content_length(&self) -> Option<u64> {
        self.progress.lock().content_length
    }

    /// Signal the transport to abort. The state flips to `Cancelled` immediately; the task
    /// removes the partial file once the transfer has stopped.
    /// Returns `false` when the job had already reached a terminal state.
    pub fn cancel(&self) -> bool {
        let cancelled = {
            let mut progress = self.progress.lock();
            if progress.state.is_terminal() {
                false
            } else {
                progress.state = JobState::Cancelled;
                true
            }
        };

        self.token.cancel();
        if cancelled {
            debug!(job = %self.id, "Download job cancelled");
        }
        cancelled
    }
}

/// Callback surface handed to a [`Transport`] for one transfer.
#[derive(Debug)]
pub struct TransferSink {
    handle: JobHandle,
    events: mpsc::UnboundedSender<JobEvent>,
}

impl TransferSink {
    pub fn job_id(&self) -> JobId {
        self.handle.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.token.is_cancelled()
    }

    /// Resolves once the job has been cancelled. Transports race their network waits
    /// against this and return without starting new file operations.
    pub async fn cancelled(&self) {
        self.handle.token.cancelled().await
    }

    /// The transport received a response. 404 and 403 fail the job right away.
    pub fn begin(&self, status: StatusCode, content_length: Option<u64>) {
        {
            let mut progress = self.handle.progress.lock();
            if progress.state.is_terminal() {
                trace!(job = %self.handle.id, "Ignoring begin after terminal state");
                return;
            }
            progress.content_length = content_length;
            progress.state = match FailureKind::refusal(status) {
                Some(kind) => JobState::Failed(kind),
                None => JobState::InProgress,
            };
        }

        self.emit(JobEventKind::Begin {
            status,
            content_length,
        });
    }

    /// Bytes flushed to the target file so far. Reaching the announced content length
    /// completes the job even if the transport never reports a final status.
    pub fn progress(&self, bytes_written: u64, content_length: Option<u64>) {
        let completed = {
            let mut progress = self.handle.progress.lock();
            if progress.state.is_terminal() {
                return;
            }
            progress.state = JobState::InProgress;
            progress.bytes_written = bytes_written;
            progress.content_length = content_length.or(progress.content_length);

            let done = bytes_written > 0 && progress.content_length == Some(bytes_written);
            if done {
                progress.state = JobState::Completed;
                progress.reported = true;
            }
            done
        };

        self.emit(JobEventKind::Progress {
            bytes_written,
            content_length,
        });

        if completed {
            debug!(job = %self.handle.id, bytes_written, "Completion inferred from byte count");
            self.emit(JobEventKind::Finished(JobOutcome::Completed));
        }
    }

    // Apply the transfer's own terminal result and report whichever terminal state won.
    async fn finish(&self, candidate: JobOutcome) {
        let outcome = {
            let mut progress = self.handle.progress.lock();
            if !progress.state.is_terminal() {
                progress.state = candidate.into_state();
            }
            if progress.reported {
                None
            } else {
                progress.reported = true;
                JobOutcome::from_state(&progress.state)
            }
        };

        let Some(outcome) = outcome else {
            trace!(job = %self.handle.id, "Terminal state already reported");
            return;
        };

        match &outcome {
            JobOutcome::Completed => {
                info!(job = %self.handle.id, path = ?self.handle.target, "Download completed")
            }
            JobOutcome::Failed(kind) => {
                warn!(job = %self.handle.id, reason = %kind, "Download failed");
                remove_file_best_effort(&self.handle.target).await;
            }
            JobOutcome::Cancelled => {
                remove_file_best_effort(&self.handle.target).await;
            }
        }

        self.emit(JobEventKind::Finished(outcome));
    }

    fn emit(&self, kind: JobEventKind) {
        // The owner may already be gone; nobody is left to tell.
        let _ = self.events.send(JobEvent {
            job: self.handle.id,
            kind,
        });
    }
}

/// A running transfer, owned by exactly one controller
#[derive(Debug)]
pub struct DownloadJob {
    handle: JobHandle,
    task: JoinHandle<()>,
}

impl DownloadJob {
    /// Spawn the transfer of `request` into `target`.
    pub fn start(
        id: JobId,
        transport: Arc<dyn Transport>,
        request: ResourceRequest,
        target: PathBuf,
        events: mpsc::UnboundedSender<JobEvent>,
    ) -> Self {
        let handle = JobHandle::new(id, target);
        let sink = TransferSink {
            handle: handle.clone(),
            events,
        };

        info!(job = %id, uri = %request.uri(), path = ?handle.target, "Starting download");
        let task = tokio::spawn(run(transport, request, sink));

        Self { handle, task }
    }

    pub fn id(&self) -> JobId {
        self.handle.id
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }

    /// Wait until the task has stopped touching the target file.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(job = %self.handle.id, error = %e, "Download task ended abnormally");
        }
    }

    /// Let the task run to its end unobserved.
    pub fn detach(self) {
        drop(self.task);
    }
}

async fn run(transport: Arc<dyn Transport>, request: ResourceRequest, sink: TransferSink) {
    let token = sink.handle.token.clone();
    let target = Arc::clone(&sink.handle.target);

    let download = transport.download(&request, &target, &sink);
    tokio::pin!(download);

    let result = tokio::select! {
        biased;
        result = &mut download => Some(result),
        _ = token.cancelled() => None,
    };

    // A file operation the transport already started keeps running on the blocking pool
    // even if its future is dropped. Let the transport settle so cleanup runs after it.
    let result = match result {
        Some(result) => Some(result),
        None => match tokio::time::timeout(CANCEL_GRACE, &mut download).await {
            Ok(_) => None,
            Err(_) => {
                warn!(job = %sink.handle.id, "Transport ignored cancellation, dropping it");
                None
            }
        },
    };

    let outcome = match result {
        None => JobOutcome::Cancelled,
        Some(Ok(status)) if status.is_success() => JobOutcome::Completed,
        Some(Ok(status)) => JobOutcome::Failed(FailureKind::from_status(status)),
        Some(Err(e)) => JobOutcome::Failed(FailureKind::Transfer(e.to_string())),
    };

    sink.finish(outcome).await;
}
