//! Unified error type for vid2audio.
//!
//! Every failure the job core or its collaborators can report funnels into
//! [`Error`], which carries enough context for the HTTP layer to derive a
//! status code via [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes in vid2audio.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Submission data failed validation. The job is never created.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The job exists but has no retrievable result.
    #[error("Not ready: {0}")]
    NotReady(String),

    /// An upload exceeded the configured size limit.
    #[error("Payload too large: {0}")]
    TooLarge(String),

    /// A `Complete` job's output file disappeared before retrieval.
    #[error("Result missing for job {id}")]
    ResultMissing {
        /// The job whose output is gone.
        id: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe) could not be run or failed.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            Error::NotReady(_) => 400,
            Error::TooLarge(_) => 413,
            Error::ResultMissing { .. } => 500,
            Error::Io { .. } => 500,
            Error::Tool { .. } => 502,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Validation(_) => "validation_error",
            Error::NotReady(_) => "not_ready",
            Error::TooLarge(_) => "payload_too_large",
            Error::ResultMissing { .. } => "result_missing",
            Error::Io { .. } => "io_error",
            Error::Tool { .. } => "tool_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
