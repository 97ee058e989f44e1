//! Job model and scheduling.

mod cleanup;
mod registry;
mod scheduler;
mod types;

pub use cleanup::FileCleanup;
pub use registry::{CompletedEntry, CompletedRegistry};
pub use scheduler::{start_reaper, JobScheduler, RetrievedOutput, RESULT_MISSING_DETAIL};
pub use types::{Job, JobStatus, JobSummary};
