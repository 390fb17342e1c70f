//! Pipeline error types.

use montage_core::MontageError;
use std::path::PathBuf;
use thiserror::Error;

use crate::job::{JobId, JobState};

/// Errors returned by scheduler and configuration calls.
///
/// Job failures are not errors: they are reported as terminal job states.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown job: {0}")]
    UnknownJob(JobId),

    #[error("Job {job_id} is still {state}")]
    NotTerminal { job_id: JobId, state: JobState },

    #[error("Scheduler is shutting down")]
    ShuttingDown,

    #[error("No Tokio runtime available to run jobs")]
    NoRuntime,

    #[error("Config error at {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error(transparent)]
    Montage(#[from] MontageError),
}

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
