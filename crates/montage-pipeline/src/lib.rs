//! Montage Pipeline - background media jobs
//!
//! This crate handles:
//! - The media catalog and asset status transitions
//! - Probe, proxy and export job scheduling with bounded concurrency
//! - Retries, deadlines and cancellation of engine calls
//! - Service configuration

pub mod catalog;
pub mod config;
pub mod error;
pub mod job;
pub mod retry;
pub mod scheduler;

pub use catalog::MediaCatalog;
pub use config::{
    config_file_path, EngineConfig, ExportConfig, LoggingConfig, MontageConfig, PipelineConfig,
    CONFIG_ENV,
};
pub use error::{PipelineError, PipelineResult};
pub use job::{JobEvent, JobHandle, JobId, JobInfo, JobKind, JobOutcome, JobRequest, JobState, JobSubject};
pub use retry::RetryPolicy;
pub use scheduler::{ImportTicket, Scheduler, SchedulerConfig};
