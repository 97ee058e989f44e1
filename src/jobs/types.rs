use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vid2audio_core::{Error, JobId, Result, TrimWindow};

/// Lifecycle state of a job.
///
/// `Uploading -> Uploaded -> Processing -> Complete | Error`. The only edge
/// out of a terminal state is `Complete -> Error`, taken when a finished
/// job's output disappears before it is retrieved.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploading,
    Uploaded,
    Processing,
    Complete,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Uploading, Uploaded)
                | (Uploaded, Processing)
                | (Processing, Complete)
                | (Processing, Error)
                | (Complete, Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Uploading => "uploading",
            JobStatus::Uploaded => "uploaded",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work, from upload to retrieval or eviction.
///
/// State changes go through the methods below, which keep `completed_at`,
/// `result` and `error_detail` consistent with `status`.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[schema(value_type = String)]
    id: JobId,
    #[serde(skip)]
    source: PathBuf,
    filename: String,
    trim: Option<TrimWindow>,
    status: JobStatus,
    upload_progress: f32,
    conversion_progress: f32,
    #[serde(skip)]
    result: Option<PathBuf>,
    output_filename: Option<String>,
    error_detail: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A freshly created job, still receiving its upload.
    pub fn new(
        id: JobId,
        filename: impl Into<String>,
        source: PathBuf,
        trim: Option<TrimWindow>,
    ) -> Self {
        Self {
            id,
            source,
            filename: filename.into(),
            trim,
            status: JobStatus::Uploading,
            upload_progress: 0.0,
            conversion_progress: 0.0,
            result: None,
            output_filename: None,
            error_detail: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn trim(&self) -> Option<&TrimWindow> {
        self.trim.as_ref()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn upload_progress(&self) -> f32 {
        self.upload_progress
    }

    pub fn conversion_progress(&self) -> f32 {
        self.conversion_progress
    }

    /// Location of the produced output. Only set while `Complete`.
    pub fn result(&self) -> Option<&Path> {
        self.result.as_deref()
    }

    pub fn output_filename(&self) -> Option<&str> {
        self.output_filename.as_deref()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::Internal(format!(
                "job {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Raise upload progress. Returns whether the value changed.
    ///
    /// Lower values are ignored; progress never moves backward.
    pub fn set_upload_progress(&mut self, pct: f32) -> bool {
        if self.status != JobStatus::Uploading || pct.is_nan() {
            return false;
        }
        let pct = pct.clamp(0.0, 100.0);
        if pct <= self.upload_progress {
            return false;
        }
        self.upload_progress = pct;
        true
    }

    /// Replace the trim window. Only allowed while the upload is running.
    pub fn set_trim(&mut self, trim: Option<TrimWindow>) -> Result<()> {
        if self.status != JobStatus::Uploading {
            return Err(Error::Internal(format!(
                "job {} is {}, trim can no longer change",
                self.id, self.status
            )));
        }
        self.trim = trim;
        Ok(())
    }

    pub fn mark_uploaded(&mut self) -> Result<()> {
        self.transition(JobStatus::Uploaded)?;
        self.upload_progress = 100.0;
        Ok(())
    }

    pub fn start_processing(&mut self) -> Result<()> {
        self.transition(JobStatus::Processing)?;
        self.conversion_progress = 0.0;
        Ok(())
    }

    /// Raise conversion progress. Returns whether the value changed.
    pub fn set_conversion_progress(&mut self, pct: f32) -> bool {
        if self.status != JobStatus::Processing || pct.is_nan() {
            return false;
        }
        let pct = pct.clamp(0.0, 100.0);
        if pct <= self.conversion_progress {
            return false;
        }
        self.conversion_progress = pct;
        true
    }

    pub fn complete(
        &mut self,
        result: PathBuf,
        output_filename: String,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.transition(JobStatus::Complete)?;
        self.conversion_progress = 100.0;
        self.result = Some(result);
        self.output_filename = Some(output_filename);
        self.completed_at = Some(at);
        Ok(())
    }

    pub fn fail(&mut self, detail: impl Into<String>, at: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Error)?;
        self.error_detail = Some(detail.into());
        self.completed_at = Some(at);
        Ok(())
    }

    /// Demote a `Complete` job whose output is gone. `completed_at` is kept,
    /// so the job's place in completion order does not change.
    pub fn mark_result_missing(&mut self, detail: impl Into<String>) -> Result<()> {
        if self.status != JobStatus::Complete {
            return Err(Error::Internal(format!(
                "job {} is {}, not complete",
                self.id, self.status
            )));
        }
        self.transition(JobStatus::Error)?;
        self.result = None;
        self.error_detail = Some(detail.into());
        Ok(())
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            filename: self.filename.clone(),
            status: self.status,
            upload_progress: self.upload_progress,
            conversion_progress: self.conversion_progress,
        }
    }

    #[cfg(test)]
    pub(crate) fn force_status(&mut self, status: JobStatus) {
        self.status = status;
    }
}

/// The per-job entry of a status listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    #[schema(value_type = String)]
    pub id: JobId,
    pub filename: String,
    pub status: JobStatus,
    pub upload_progress: f32,
    pub conversion_progress: f32,
}
