//! Fan-out of job state changes to attached observers.
//!
//! Each observer owns a bounded channel. [`Notifier::broadcast`] never waits
//! on an observer: one whose buffer is full or whose receiver is gone is
//! pruned and the broadcast carries on. The last published queue listing is
//! kept so that polling clients and newly attached observers see exactly what
//! push observers were last sent.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use vid2audio_core::{JobId, ObserverId};

use crate::jobs::JobSummary;

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A message pushed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum Notification {
    /// Full listing of every known job.
    QueueUpdate { queue: Vec<JobSummary> },
    JobProgress { job_id: JobId, progress: f32 },
    JobComplete {
        job_id: JobId,
        filename: String,
        output_filename: String,
    },
    JobError {
        job_id: JobId,
        filename: String,
        error: String,
    },
}

impl Notification {
    /// The `type` tag, usable as an SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::QueueUpdate { .. } => "queue_update",
            Notification::JobProgress { .. } => "job_progress",
            Notification::JobComplete { .. } => "job_complete",
            Notification::JobError { .. } => "job_error",
        }
    }

    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Notification::QueueUpdate { .. } => None,
            Notification::JobProgress { job_id, .. }
            | Notification::JobComplete { job_id, .. }
            | Notification::JobError { job_id, .. } => Some(*job_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

pub struct Notifier {
    observers: DashMap<ObserverId, mpsc::Sender<Arc<Notification>>>,
    snapshot: RwLock<Arc<Vec<JobSummary>>>,
    buffer: usize,
}

impl Notifier {
    /// Create a notifier whose observers may fall `buffer` messages behind.
    pub fn new(buffer: usize) -> Arc<Self> {
        Arc::new(Self {
            observers: DashMap::new(),
            snapshot: RwLock::new(Arc::new(Vec::new())),
            buffer: buffer.max(1),
        })
    }

    /// Attach a new observer. It is detached when the returned handle drops.
    pub fn attach(self: &Arc<Self>) -> Observer {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = ObserverId::new();
        self.observers.insert(id, tx);
        tracing::debug!(observer_id = %id, "Observer attached ({} total)", self.observers.len());
        Observer {
            id,
            rx,
            notifier: Arc::downgrade(self),
        }
    }

    pub fn detach(&self, id: ObserverId) -> bool {
        let removed = self.observers.remove(&id).is_some();
        if removed {
            tracing::debug!(observer_id = %id, "Observer detached");
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Deliver to every attached observer. Returns the number reached.
    pub fn broadcast(&self, notification: Notification) -> usize {
        let message = Arc::new(notification);
        let mut delivered = 0;
        let mut pruned = Vec::new();

        for entry in self.observers.iter() {
            match entry.value().try_send(Arc::clone(&message)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        observer_id = %entry.key(),
                        "Observer fell {} messages behind, pruning",
                        self.buffer
                    );
                    pruned.push(*entry.key());
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(observer_id = %entry.key(), "Observer went away, pruning");
                    pruned.push(*entry.key());
                }
            }
        }

        // Removal must wait until the iterator's shard locks are released.
        for id in pruned {
            self.observers.remove(&id);
        }

        delivered
    }

    /// Store a new listing and push it to every observer.
    pub fn publish(&self, queue: Vec<JobSummary>) {
        let shared = Arc::new(queue);
        *self.snapshot.write() = Arc::clone(&shared);
        self.broadcast(Notification::QueueUpdate {
            queue: shared.as_ref().clone(),
        });
    }

    /// The most recently published listing.
    pub fn snapshot(&self) -> Arc<Vec<JobSummary>> {
        Arc::clone(&self.snapshot.read())
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Receiving end of one attached observer.
pub struct Observer {
    id: ObserverId,
    rx: mpsc::Receiver<Arc<Notification>>,
    notifier: Weak<Notifier>,
}

impl Observer {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Next notification, or `None` once this observer has been pruned.
    pub async fn recv(&mut self) -> Option<Arc<Notification>> {
        self.rx.recv().await
    }

    /// Non-blocking receive, for tests and draining.
    pub fn try_recv(&mut self) -> Option<Arc<Notification>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.detach(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;

    fn summary(name: &str) -> JobSummary {
        JobSummary {
            id: JobId::new(),
            filename: name.into(),
            status: JobStatus::Uploaded,
            upload_progress: 100.0,
            conversion_progress: 0.0,
        }
    }

    #[test]
    fn wire_format_matches_clients() {
        let id = JobId::new();
        let value = serde_json::to_value(Notification::JobComplete {
            job_id: id,
            filename: "a.mp4".into(),
            output_filename: "a_start-end.mp3".into(),
        })
        .unwrap();
        assert_eq!(value["type"], "job_complete");
        assert_eq!(value["jobId"], id.to_string());
        assert_eq!(value["outputFilename"], "a_start-end.mp3");

        let value = serde_json::to_value(Notification::JobProgress {
            job_id: id,
            progress: 42.5,
        })
        .unwrap();
        assert_eq!(value["type"], "job_progress");
        assert_eq!(value["progress"], 42.5);

        let value = serde_json::to_value(Notification::QueueUpdate { queue: vec![] }).unwrap();
        assert_eq!(value["type"], "queue_update");
        assert!(value["queue"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_observer() {
        let notifier = Notifier::new(8);
        let mut a = notifier.attach();
        let mut b = notifier.attach();

        let delivered = notifier.broadcast(Notification::JobProgress {
            job_id: JobId::new(),
            progress: 10.0,
        });
        assert_eq!(delivered, 2);
        assert_eq!(a.recv().await.unwrap().kind(), "job_progress");
        assert_eq!(b.recv().await.unwrap().kind(), "job_progress");
    }

    #[tokio::test]
    async fn dropped_observer_is_detached() {
        let notifier = Notifier::new(8);
        let a = notifier.attach();
        let _b = notifier.attach();
        assert_eq!(notifier.observer_count(), 2);
        drop(a);
        assert_eq!(notifier.observer_count(), 1);
    }

    #[tokio::test]
    async fn slow_observer_is_pruned_without_blocking_others() {
        let notifier = Notifier::new(2);
        let mut slow = notifier.attach();
        let mut fast = notifier.attach();

        for i in 0..3 {
            notifier.broadcast(Notification::JobProgress {
                job_id: JobId::new(),
                progress: i as f32,
            });
            // The fast observer keeps up.
            assert!(fast.try_recv().is_some());
        }

        assert_eq!(notifier.observer_count(), 1);
        // The slow observer drains what it had, then sees the channel close.
        assert!(slow.recv().await.is_some());
        assert!(slow.recv().await.is_some());
        assert!(slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn publish_updates_snapshot_and_pushes() {
        let notifier = Notifier::new(8);
        let mut obs = notifier.attach();
        let queue = vec![summary("a.mp4"), summary("b.mp4")];

        notifier.publish(queue.clone());
        assert_eq!(notifier.snapshot().as_ref(), &queue);
        match obs.recv().await.unwrap().as_ref() {
            Notification::QueueUpdate { queue: pushed } => assert_eq!(pushed, &queue),
            other => panic!("unexpected {other:?}"),
        }
        assert!(obs.try_recv().is_none());
    }

    #[test]
    fn per_job_order_is_preserved() {
        let notifier = Notifier::new(8);
        let mut obs = notifier.attach();
        let id = JobId::new();
        notifier.broadcast(Notification::JobProgress { job_id: id, progress: 50.0 });
        notifier.broadcast(Notification::JobError {
            job_id: id,
            filename: "a.mp4".into(),
            error: "boom".into(),
        });
        assert_eq!(obs.try_recv().unwrap().kind(), "job_progress");
        assert_eq!(obs.try_recv().unwrap().kind(), "job_error");
    }
}
