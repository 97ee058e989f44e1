//! Deferred deletion of the files a job owns.

use std::path::{Path, PathBuf};
use vid2audio_core::JobId;

/// Files to delete when this value is dropped.
///
/// Every terminal job carries one. Whoever ends up owning it (the completed
/// registry, a retrieval response body, or the reaper) releases the files
/// simply by dropping it, so deletion runs exactly once. Failures are logged
/// and never affect the job.
#[derive(Debug)]
pub struct FileCleanup {
    job_id: JobId,
    paths: Vec<PathBuf>,
}

impl FileCleanup {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            paths: Vec::new(),
        }
    }

    pub fn with(mut self, path: impl Into<PathBuf>) -> Self {
        self.add(path);
        self
    }

    pub fn add(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for FileCleanup {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            remove(self.job_id, &path);
        }
    }
}

fn remove(job_id: JobId, path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(job_id = %job_id, "Deleted {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(job_id = %job_id, "{:?} already gone", path)
        }
        Err(e) => tracing::warn!(job_id = %job_id, "Failed to delete {:?}: {}", path, e),
    }
}
