//! Job model: what the scheduler runs and what it reports.

use montage_core::AssetId;
use montage_media::ExportPlan;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Scheduler-scoped job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{:06}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Probe,
    ProxyGenerate,
    ExportRender,
}

impl JobKind {
    /// Round-robin service order.
    pub const ALL: [JobKind; 3] = [Self::Probe, Self::ProxyGenerate, Self::ExportRender];

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Probe => 0,
            Self::ProxyGenerate => 1,
            Self::ExportRender => 2,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Probe => "probe",
            Self::ProxyGenerate => "proxy",
            Self::ExportRender => "export",
        })
    }
}

/// What a job operates on.
#[derive(Debug, Clone, PartialEq)]
pub enum JobSubject {
    Asset(AssetId),
    Export(Arc<ExportPlan>),
}

impl JobSubject {
    pub fn asset(&self) -> Option<AssetId> {
        match self {
            Self::Asset(id) => Some(*id),
            Self::Export(_) => None,
        }
    }

    pub fn project(&self) -> Option<Uuid> {
        match self {
            Self::Asset(_) => None,
            Self::Export(plan) => Some(plan.project_id),
        }
    }
}

impl fmt::Display for JobSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asset(id) => write!(f, "{id}"),
            Self::Export(plan) => write!(f, "export {}", plan.fingerprint_hex8()),
        }
    }
}

/// Submission request. Built through the constructors so kind and subject agree.
#[derive(Debug, Clone)]
pub struct JobRequest {
    kind: JobKind,
    subject: JobSubject,
}

impl JobRequest {
    pub fn probe(asset: AssetId) -> Self {
        Self {
            kind: JobKind::Probe,
            subject: JobSubject::Asset(asset),
        }
    }

    pub fn proxy(asset: AssetId) -> Self {
        Self {
            kind: JobKind::ProxyGenerate,
            subject: JobSubject::Asset(asset),
        }
    }

    pub fn export(plan: impl Into<Arc<ExportPlan>>) -> Self {
        Self {
            kind: JobKind::ExportRender,
            subject: JobSubject::Export(plan.into()),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn subject(&self) -> &JobSubject {
        &self.subject
    }

    pub(crate) fn into_parts(self) -> (JobKind, JobSubject) {
        (self.kind, self.subject)
    }

    /// Identity used to collapse duplicate submissions.
    pub(crate) fn dedup_key(&self) -> DedupKey {
        match &self.subject {
            JobSubject::Asset(id) => DedupKey::Asset(*id, self.kind),
            JobSubject::Export(plan) => DedupKey::Export(plan.fingerprint),
        }
    }
}

impl From<ExportPlan> for JobRequest {
    fn from(plan: ExportPlan) -> Self {
        Self::export(plan)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum DedupKey {
    Asset(AssetId, JobKind),
    Export(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed(String),
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => f.write_str("queued"),
            Self::Running => f.write_str("running"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Terminal result of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    /// Human-readable summary, always set for failures and cancellations.
    pub reason: Option<String>,
    /// Produced file: proxy or export output.
    pub artifact: Option<PathBuf>,
}

impl JobOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == JobState::Succeeded
    }
}

/// Point-in-time view of a registered job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInfo {
    pub id: JobId,
    pub kind: JobKind,
    pub subject: JobSubject,
    pub state: JobState,
    pub attempts: u32,
}

/// State change broadcast to hosts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    pub attempt: u32,
}

/// Awaitable completion of one job. Any number of handles may watch the same job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_id: JobId,
    kind: JobKind,
    rx: watch::Receiver<Option<JobOutcome>>,
}

impl JobHandle {
    pub(crate) fn new(
        job_id: JobId,
        kind: JobKind,
        rx: watch::Receiver<Option<JobOutcome>>,
    ) -> Self {
        Self { job_id, kind, rx }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Outcome if the job already finished.
    pub fn try_outcome(&self) -> Option<JobOutcome> {
        self.rx.borrow().clone()
    }

    /// Wait for the terminal outcome.
    pub async fn wait(&mut self) -> JobOutcome {
        if let Ok(outcome) = self.rx.wait_for(Option::is_some).await {
            if let Some(outcome) = outcome.clone() {
                return outcome;
            }
        }
        // The scheduler dropped the job without settling it.
        self.try_outcome().unwrap_or_else(|| JobOutcome {
            job_id: self.job_id,
            kind: self.kind,
            state: JobState::Cancelled,
            reason: Some("scheduler dropped the job".into()),
            artifact: None,
        })
    }
}
