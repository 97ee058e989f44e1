//! The job scheduler: upload table, FIFO pending queue, single worker,
//! completed registry and reaper.
//!
//! All mutable state sits behind one mutex that is never held across an
//! await. The worker is a spawned task that exists only while there is work;
//! `worker_active` guarantees at most one is running.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vid2audio_av::{TranscodeEngine, TranscodeEvent, TranscodeRequest};
use vid2audio_core::{Error, JobId, Result, TrimWindow};

use super::cleanup::FileCleanup;
use super::registry::{CompletedEntry, CompletedRegistry};
use super::types::{Job, JobStatus, JobSummary};
use crate::notifier::{Notification, Notifier};

/// Error detail recorded when a finished job's output vanished.
pub const RESULT_MISSING_DETAIL: &str = "Output file missing from server.";

struct SchedulerState {
    /// Jobs still receiving their upload, in creation order.
    uploading: Vec<Job>,
    /// Uploaded jobs in arrival order. The head is the active job while the
    /// worker is transcoding it.
    pending: VecDeque<Job>,
    worker_active: bool,
    completed: CompletedRegistry,
}

impl SchedulerState {
    fn summaries(&self) -> Vec<JobSummary> {
        self.pending
            .iter()
            .chain(self.uploading.iter())
            .chain(self.completed.jobs())
            .map(Job::summary)
            .collect()
    }

    fn find(&self, id: JobId) -> Option<&Job> {
        self.pending
            .iter()
            .chain(self.uploading.iter())
            .find(|j| j.id() == id)
            .or_else(|| self.completed.get(id))
    }

    fn take_upload(&mut self, id: JobId) -> Result<Job> {
        let index = self
            .uploading
            .iter()
            .position(|j| j.id() == id)
            .ok_or_else(|| Error::not_found("upload", id))?;
        Ok(self.uploading.remove(index))
    }
}

/// A retrieved output. Dropping it deletes the file.
#[derive(Debug)]
pub struct RetrievedOutput {
    pub job: Job,
    pub path: PathBuf,
    pub filename: String,
    pub cleanup: FileCleanup,
}

/// Owns every job from upload to retrieval or eviction.
pub struct JobScheduler {
    state: Mutex<SchedulerState>,
    engine: Arc<dyn TranscodeEngine>,
    notifier: Arc<Notifier>,
    output_dir: PathBuf,
}

impl JobScheduler {
    pub fn new(
        engine: Arc<dyn TranscodeEngine>,
        notifier: Arc<Notifier>,
        output_dir: PathBuf,
        retention: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SchedulerState {
                uploading: Vec::new(),
                pending: VecDeque::new(),
                worker_active: false,
                completed: CompletedRegistry::new(retention),
            }),
            engine,
            notifier,
            output_dir,
        })
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    // -----------------------------------------------------------------------
    // Upload phase
    // -----------------------------------------------------------------------

    /// Create a job whose source is still being written to `source`.
    pub fn begin_upload(
        &self,
        id: JobId,
        filename: impl Into<String>,
        source: PathBuf,
        trim: Option<TrimWindow>,
    ) -> JobId {
        let job = Job::new(id, filename, source, trim);
        tracing::info!(job_id = %id, "Upload started: {}", job.filename());

        let mut state = self.state.lock();
        state.uploading.push(job);
        self.publish(&state);
        id
    }

    /// Record upload progress. Lower values than already seen are ignored.
    pub fn update_upload_progress(&self, id: JobId, pct: f32) -> Result<()> {
        let mut state = self.state.lock();
        let job = state
            .uploading
            .iter_mut()
            .find(|j| j.id() == id)
            .ok_or_else(|| Error::not_found("upload", id))?;

        let before = job.upload_progress().floor();
        if job.set_upload_progress(pct) && job.upload_progress().floor() > before {
            self.publish(&state);
        }
        Ok(())
    }

    /// Set the trim window of a job still in its upload phase.
    pub fn set_upload_trim(&self, id: JobId, trim: Option<TrimWindow>) -> Result<()> {
        let mut state = self.state.lock();
        let job = state
            .uploading
            .iter_mut()
            .find(|j| j.id() == id)
            .ok_or_else(|| Error::not_found("upload", id))?;
        job.set_trim(trim)
    }

    /// The source is fully written: mark the job `Uploaded` and queue it.
    pub fn finish_upload(self: &Arc<Self>, id: JobId) -> Result<()> {
        {
            let mut state = self.state.lock();
            let mut job = state.take_upload(id)?;
            job.mark_uploaded()?;
            tracing::info!(job_id = %id, "Upload finished, queued at position {}", state.pending.len() + 1);
            state.pending.push_back(job);
            self.publish(&state);
        }
        self.kick();
        Ok(())
    }

    /// Drop a job whose upload failed, together with its partial file.
    pub fn abort_upload(&self, id: JobId, reason: &str) -> Result<()> {
        let job = {
            let mut state = self.state.lock();
            let job = state.take_upload(id)?;
            self.publish(&state);
            job
        };
        tracing::warn!(job_id = %id, "Upload of {} aborted: {}", job.filename(), reason);
        drop(FileCleanup::new(id).with(job.source()));
        Ok(())
    }

    /// Queue a job whose source is already complete on disk.
    pub fn submit(
        self: &Arc<Self>,
        filename: impl Into<String>,
        source: PathBuf,
        trim: Option<TrimWindow>,
    ) -> Result<JobId> {
        let id = self.begin_upload(JobId::new(), filename, source, trim);
        self.finish_upload(id)?;
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Worker
    // -----------------------------------------------------------------------

    /// Start the worker unless it is already running.
    fn kick(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.worker_active || state.pending.is_empty() {
                return;
            }
            state.worker_active = true;
        }
        tokio::spawn(Arc::clone(self).drive());
    }

    async fn drive(self: Arc<Self>) {
        tracing::debug!("Worker started");
        loop {
            let Some(request) = self.start_next() else {
                tracing::debug!("Worker idle");
                return;
            };
            let id = request.job_id;

            let mut stream = self.engine.transcode(request);
            let outcome = loop {
                match stream.next().await {
                    Some(TranscodeEvent::Progress(pct)) => self.record_progress(id, pct),
                    Some(TranscodeEvent::Completed(path)) => break Ok(path),
                    Some(TranscodeEvent::Failed(message)) => break Err(message),
                    None => break Err("engine stream ended without an outcome".to_string()),
                }
            };

            self.finish_active(id, outcome);
            self.evict_expired(Utc::now());
        }
    }

    /// Promote the head of the queue to `Processing`, discarding any head
    /// that is not in the expected state. Clears `worker_active` and returns
    /// `None` once the queue is empty.
    fn start_next(&self) -> Option<TranscodeRequest> {
        let mut discarded = Vec::new();
        let request = {
            let mut state = self.state.lock();
            loop {
                let Some(head) = state.pending.front_mut() else {
                    state.worker_active = false;
                    if !discarded.is_empty() {
                        self.publish(&state);
                    }
                    break None;
                };

                if head.status() != JobStatus::Uploaded {
                    if let Some(job) = state.pending.pop_front() {
                        tracing::warn!(
                            job_id = %job.id(),
                            "Discarding queued job in unexpected state {}",
                            job.status()
                        );
                        discarded.push(job);
                    }
                    continue;
                }

                if let Err(e) = head.start_processing() {
                    tracing::error!(job_id = %head.id(), "{e}");
                    if let Some(job) = state.pending.pop_front() {
                        discarded.push(job);
                    }
                    continue;
                }
                tracing::info!(
                    job_id = %head.id(),
                    engine = self.engine.name(),
                    "Processing {}",
                    head.filename()
                );
                let request = TranscodeRequest {
                    job_id: head.id(),
                    source: head.source().to_path_buf(),
                    display_name: head.filename().to_string(),
                    trim: head.trim().copied(),
                    output_dir: self.output_dir.clone(),
                };
                self.publish(&state);
                break Some(request);
            }
        };

        for job in discarded {
            drop(FileCleanup::new(job.id()).with(job.source()));
        }
        request
    }

    fn record_progress(&self, id: JobId, pct: f32) {
        let mut state = self.state.lock();
        let Some(job) = state.pending.front_mut().filter(|j| j.id() == id) else {
            tracing::warn!(job_id = %id, "Progress for a job that is not active");
            return;
        };
        if !job.set_conversion_progress(pct) {
            return;
        }
        let progress = job.conversion_progress();
        tracing::debug!(job_id = %id, "Conversion progress {:.1}%", progress);
        self.publish(&state);
        self.notifier
            .broadcast(Notification::JobProgress { job_id: id, progress });
    }

    /// Move the active job into the completed registry.
    ///
    /// A head that is no longer `Processing` is discarded like any other
    /// anomalous head, together with its files.
    fn finish_active(&self, id: JobId, outcome: std::result::Result<PathBuf, String>) {
        // Deleted once the lock is released.
        let mut release = FileCleanup::new(id);
        let mut state = self.state.lock();

        if state.pending.front().map(Job::id) != Some(id) {
            tracing::error!(job_id = %id, "Active job vanished from the head of the queue");
            if let Ok(path) = outcome {
                release.add(path);
            }
            return;
        }
        let Some(mut job) = state.pending.pop_front() else {
            return;
        };

        if job.status() != JobStatus::Processing {
            tracing::warn!(
                job_id = %id,
                "Discarding finished job in unexpected state {}",
                job.status()
            );
            release.add(job.source());
            if let Ok(path) = outcome {
                release.add(path);
            }
            self.publish(&state);
            return;
        }

        let now = Utc::now();
        let mut cleanup = FileCleanup::new(id);
        let outcome = match outcome {
            Ok(path) => {
                let output_filename = presented_name(id, &path);
                cleanup.add(path.clone());
                job.complete(path, output_filename.clone(), now)
                    .map(|()| output_filename)
                    .map_err(|e| e.to_string())
            }
            Err(message) => Err(message),
        };

        let notification = match outcome {
            Ok(output_filename) => {
                tracing::info!(job_id = %id, "Conversion complete: {}", output_filename);
                release.add(job.source());
                Notification::JobComplete {
                    job_id: id,
                    filename: job.filename().to_string(),
                    output_filename,
                }
            }
            Err(message) => {
                tracing::error!(job_id = %id, "Conversion failed: {}", message);
                cleanup.add(job.source());
                if let Err(e) = job.fail(message.clone(), now) {
                    tracing::error!(job_id = %id, "{e}");
                }
                Notification::JobError {
                    job_id: id,
                    filename: job.filename().to_string(),
                    error: message,
                }
            }
        };

        state.completed.push(job, cleanup);
        self.publish(&state);
        self.notifier.broadcast(notification);
    }

    // -----------------------------------------------------------------------
    // Completed registry
    // -----------------------------------------------------------------------

    /// Take the output of a `Complete` job, removing the job.
    ///
    /// If the output file has disappeared the job is turned into an `Error`
    /// in place and [`Error::ResultMissing`] is returned.
    pub fn retrieve(&self, id: JobId) -> Result<RetrievedOutput> {
        let mut state = self.state.lock();

        if let Some(job) = state.pending.iter().chain(state.uploading.iter()).find(|j| j.id() == id) {
            return Err(Error::NotReady(format!("job {id} is {}", job.status())));
        }

        let job = state
            .completed
            .get(id)
            .ok_or_else(|| Error::not_found("job", id))?;

        let path = match (job.status(), job.result()) {
            (JobStatus::Complete, Some(path)) => path.to_path_buf(),
            (status, _) => {
                let detail = job.error_detail().unwrap_or("no output");
                return Err(Error::NotReady(format!("job {id} is {status}: {detail}")));
            }
        };

        if !path.exists() {
            tracing::warn!(job_id = %id, "Output {:?} missing at retrieval", path);
            let Some(job) = state.completed.get_mut(id) else {
                return Err(Error::not_found("job", id));
            };
            job.mark_result_missing(RESULT_MISSING_DETAIL)?;
            let notification = Notification::JobError {
                job_id: id,
                filename: job.filename().to_string(),
                error: RESULT_MISSING_DETAIL.to_string(),
            };
            self.publish(&state);
            self.notifier.broadcast(notification);
            return Err(Error::ResultMissing { id: id.to_string() });
        }

        let Some(CompletedEntry { job, cleanup }) = state.completed.remove(id) else {
            return Err(Error::not_found("job", id));
        };
        self.publish(&state);
        drop(state);

        tracing::info!(job_id = %id, "Output retrieved");
        let filename = job
            .output_filename()
            .map(str::to_string)
            .unwrap_or_else(|| presented_name(id, &path));
        Ok(RetrievedOutput {
            job,
            path,
            filename,
            cleanup,
        })
    }

    /// Evict terminal jobs older than the retention window at `now`,
    /// deleting their files. Returns how many were evicted.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let evicted = {
            let mut state = self.state.lock();
            let evicted = state.completed.evict_expired(now);
            if !evicted.is_empty() {
                self.publish(&state);
            }
            evicted
        };

        for entry in &evicted {
            tracing::info!(job_id = %entry.job.id(), "Evicted expired {} job", entry.job.status());
        }
        // Dropping the entries releases their files.
        evicted.len()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Current listing: queued jobs, then uploads, then terminal jobs.
    pub fn snapshot(&self) -> Vec<JobSummary> {
        self.state.lock().summaries()
    }

    pub fn get_job(&self, id: JobId) -> Option<Job> {
        self.state.lock().find(id).cloned()
    }

    /// Whether the worker is idle with nothing queued.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        !state.worker_active && state.pending.is_empty()
    }

    fn publish(&self, state: &SchedulerState) {
        self.notifier.publish(state.summaries());
    }
}

/// Name shown to clients for an output written by
/// [`TranscodeRequest::output_path`].
fn presented_name(id: JobId, path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let prefix = format!("{id}-");
    match name.strip_prefix(&prefix) {
        Some(stripped) => stripped.to_string(),
        None => name,
    }
}

/// Run [`JobScheduler::evict_expired`] every `interval` until cancelled.
pub fn start_reaper(
    scheduler: Arc<JobScheduler>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Reaper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = scheduler.evict_expired(Utc::now());
                    if evicted > 0 {
                        tracing::info!("Reaper evicted {} job(s)", evicted);
                    }
                }
            }
        }
    })
}
