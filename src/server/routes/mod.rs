//! Route handlers for the HTTP API.

pub mod download;
pub mod events;
pub mod health;
pub mod jobs;
pub mod status;
pub mod tools;
pub mod upload;
pub mod ws;

use vid2audio_core::{Error, JobId};

/// Parse a job id from a path segment. Malformed ids are simply unknown.
pub(crate) fn parse_job_id(raw: &str) -> Result<JobId, Error> {
    raw.parse().map_err(|_| Error::not_found("job", raw))
}
