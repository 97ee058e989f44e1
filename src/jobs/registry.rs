//! Time-bounded holding area for terminal jobs.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use vid2audio_core::JobId;

use super::cleanup::FileCleanup;
use super::types::Job;

/// A terminal job together with the files it still owns.
#[derive(Debug)]
pub struct CompletedEntry {
    pub job: Job,
    pub cleanup: FileCleanup,
}

/// Terminal jobs in completion order.
///
/// Entries are only ever appended, so the front is always the oldest and
/// eviction can stop at the first entry still inside the retention window.
#[derive(Debug)]
pub struct CompletedRegistry {
    entries: VecDeque<CompletedEntry>,
    retention: Duration,
}

impl CompletedRegistry {
    pub fn new(retention: std::time::Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            retention: Duration::from_std(retention).unwrap_or(Duration::MAX),
        }
    }

    pub fn push(&mut self, job: Job, cleanup: FileCleanup) {
        debug_assert!(job.status().is_terminal());
        debug_assert!(
            self.entries
                .back()
                .map_or(true, |last| last.job.completed_at() <= job.completed_at()),
            "completed registry must stay in completion order"
        );
        self.entries.push_back(CompletedEntry { job, cleanup });
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.entries.iter().find(|e| e.job.id() == id).map(|e| &e.job)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.entries
            .iter_mut()
            .find(|e| e.job.id() == id)
            .map(|e| &mut e.job)
    }

    pub fn remove(&mut self, id: JobId) -> Option<CompletedEntry> {
        let index = self.entries.iter().position(|e| e.job.id() == id)?;
        self.entries.remove(index)
    }

    /// Pop every entry whose age at `now` exceeds the retention window.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> Vec<CompletedEntry> {
        let mut evicted = Vec::new();
        while let Some(front) = self.entries.front() {
            let expired = front
                .job
                .completed_at()
                .map_or(true, |at| now.signed_duration_since(at) > self.retention);
            if !expired {
                break;
            }
            if let Some(entry) = self.entries.pop_front() {
                evicted.push(entry);
            }
        }
        evicted
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.entries.iter().map(|e| &e.job)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
