//! Pipeline job scheduler.
//!
//! Jobs wait in one FIFO queue per kind. Dispatch happens whenever something
//! changes (submit, completion, cancel): kinds are served round-robin while
//! the global and per-kind caps allow. Every engine call runs under a
//! deadline and the job's cancel token; transient failures are retried with
//! backoff. Catalog transitions are applied before a job's outcome is
//! published, so a caller woken by [`JobHandle::wait`] already sees the new
//! asset state.

use montage_core::{AssetId, AssetStatus, IdGenerator, MontageError};
use montage_media::{
    parse_probe_output, probe_invocation, CancelToken, EngineError, EngineInvocation,
    EngineOutput, MediaEngine, ProxyPreset,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::MediaCatalog;
use crate::config::{MontageConfig, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::job::{
    DedupKey, JobEvent, JobHandle, JobId, JobInfo, JobKind, JobOutcome, JobRequest, JobState,
    JobSubject,
};

/// Scheduler settings: limits plus where proxies go.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub pipeline: PipelineConfig,
    pub proxy: ProxyPreset,
    pub proxy_dir: PathBuf,
}

impl SchedulerConfig {
    pub fn from_config(config: &MontageConfig) -> Self {
        Self {
            pipeline: config.pipeline.clone(),
            proxy: config.engine.proxy_preset(),
            proxy_dir: config.engine.proxy_dir.clone(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_config(&MontageConfig::default())
    }
}

/// Ids returned by [`Scheduler::import`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportTicket {
    pub asset_id: AssetId,
    pub probe: JobId,
    pub proxy: JobId,
}

struct JobEntry {
    kind: JobKind,
    subject: JobSubject,
    state: JobState,
    attempts: u32,
    cancel: CancelToken,
    outcome: watch::Sender<Option<JobOutcome>>,
    key: DedupKey,
}

impl JobEntry {
    fn info(&self, id: JobId) -> JobInfo {
        JobInfo {
            id,
            kind: self.kind,
            subject: self.subject.clone(),
            state: self.state.clone(),
            attempts: self.attempts,
        }
    }
}

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, JobEntry>,
    queues: [VecDeque<JobId>; 3],
    /// Queued or running job per dedup key.
    live: HashMap<DedupKey, JobId>,
    running: [usize; 3],
    running_total: usize,
    /// Projects with an export in flight.
    exporting: HashSet<Uuid>,
    /// Next kind index to serve.
    cursor: usize,
    shutting_down: bool,
}

struct Inner {
    config: SchedulerConfig,
    engine: Arc<dyn MediaEngine>,
    catalog: Arc<MediaCatalog>,
    runtime: Handle,
    ids: IdGenerator,
    state: Mutex<State>,
    events: broadcast::Sender<JobEvent>,
    idle: Notify,
}

/// Terminal state, reason and artifact of a job.
type Settlement = (JobState, Option<String>, Option<PathBuf>);

/// Result of running a job's engine invocations.
enum Attempted {
    Done(EngineOutput),
    Failed(String),
    Cancelled,
}

/// Runs probe, proxy and export jobs against a media engine.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Create a scheduler bound to the current Tokio runtime.
    pub fn new(
        config: SchedulerConfig,
        engine: Arc<dyn MediaEngine>,
        catalog: Arc<MediaCatalog>,
    ) -> PipelineResult<Self> {
        let runtime = Handle::try_current().map_err(|_| PipelineError::NoRuntime)?;
        let (events, _) = broadcast::channel(config.pipeline.event_capacity.max(1));
        info!(
            max_concurrency = config.pipeline.max_concurrency,
            max_attempts = config.pipeline.retry.max_attempts,
            "scheduler started"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                engine,
                catalog,
                runtime,
                ids: IdGenerator::new(),
                state: Mutex::new(State::default()),
                events,
                idle: Notify::new(),
            }),
        })
    }

    pub fn catalog(&self) -> &Arc<MediaCatalog> {
        &self.inner.catalog
    }

    /// Queue a job, or return the id of the live job already doing the same work.
    pub fn submit(&self, request: JobRequest) -> PipelineResult<JobId> {
        let key = request.dedup_key();
        let id = {
            let mut state = self.inner.state.lock();
            if state.shutting_down {
                return Err(PipelineError::ShuttingDown);
            }
            if let Some(&existing) = state.live.get(&key) {
                debug!(job = %existing, "duplicate submission joined live job");
                return Ok(existing);
            }
            if let Some(asset) = request.subject().asset() {
                if self.inner.catalog.status(asset).is_none() {
                    return Err(MontageError::NotFound(format!("asset {asset}")).into());
                }
            }

            let id = JobId::from_raw(self.inner.ids.next_raw());
            let (kind, subject) = request.into_parts();
            let (outcome, _) = watch::channel(None);
            info!(job = %id, %kind, subject = %subject, "job queued");
            state.jobs.insert(
                id,
                JobEntry {
                    kind,
                    subject,
                    state: JobState::Queued,
                    attempts: 0,
                    cancel: CancelToken::new(),
                    outcome,
                    key,
                },
            );
            state.queues[kind.index()].push_back(id);
            state.live.insert(key, id);
            self.inner.emit(&state, id);
            id
        };
        self.inner.pump();
        Ok(id)
    }

    /// Register a source file and queue its probe and proxy jobs.
    pub fn import(&self, path: impl AsRef<Path>) -> PipelineResult<ImportTicket> {
        let asset_id = self.inner.catalog.register_asset(path)?;
        let probe = self.submit(JobRequest::probe(asset_id))?;
        let proxy = self.submit(JobRequest::proxy(asset_id))?;
        Ok(ImportTicket {
            asset_id,
            probe,
            proxy,
        })
    }

    /// Cancel a job. Queued jobs settle immediately; running jobs are
    /// signalled and settle once their process is gone. Finished jobs are
    /// left untouched.
    pub fn cancel(&self, job_id: JobId) -> PipelineResult<()> {
        {
            let mut state = self.inner.state.lock();
            let (current, kind, token) = state
                .jobs
                .get(&job_id)
                .map(|e| (e.state.clone(), e.kind, e.cancel.clone()))
                .ok_or(PipelineError::UnknownJob(job_id))?;
            match current {
                JobState::Queued => {
                    state.queues[kind.index()].retain(|id| *id != job_id);
                    info!(job = %job_id, "queued job cancelled");
                    self.inner.settle(
                        &mut state,
                        job_id,
                        JobState::Cancelled,
                        Some("cancelled before start".into()),
                        None,
                    );
                }
                JobState::Running => {
                    info!(job = %job_id, "cancelling running job");
                    token.cancel();
                }
                _ => return Ok(()),
            }
        }
        self.inner.pump();
        Ok(())
    }

    /// Watch a job's completion.
    pub fn subscribe(&self, job_id: JobId) -> PipelineResult<JobHandle> {
        let state = self.inner.state.lock();
        let entry = state
            .jobs
            .get(&job_id)
            .ok_or(PipelineError::UnknownJob(job_id))?;
        Ok(JobHandle::new(job_id, entry.kind, entry.outcome.subscribe()))
    }

    pub fn status(&self, job_id: JobId) -> Option<JobState> {
        self.inner
            .state
            .lock()
            .jobs
            .get(&job_id)
            .map(|e| e.state.clone())
    }

    pub fn info(&self, job_id: JobId) -> Option<JobInfo> {
        self.inner
            .state
            .lock()
            .jobs
            .get(&job_id)
            .map(|e| e.info(job_id))
    }

    /// Every registered job, oldest first.
    pub fn list(&self) -> Vec<JobInfo> {
        let state = self.inner.state.lock();
        let mut jobs: Vec<JobInfo> = state.jobs.iter().map(|(id, e)| e.info(*id)).collect();
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    /// Drop a finished job from the registry and return its outcome.
    pub fn acknowledge(&self, job_id: JobId) -> PipelineResult<JobOutcome> {
        let mut state = self.inner.state.lock();
        let (outcome, current) = state
            .jobs
            .get(&job_id)
            .map(|e| (e.outcome.borrow().clone(), e.state.clone()))
            .ok_or(PipelineError::UnknownJob(job_id))?;
        let outcome = outcome.ok_or(PipelineError::NotTerminal {
            job_id,
            state: current,
        })?;
        state.jobs.remove(&job_id);
        Ok(outcome)
    }

    /// State changes of every job, from now on.
    pub fn events(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Cancel everything and wait for running jobs to finish.
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            state.shutting_down = true;
            let queued: Vec<JobId> = state.queues.iter_mut().flat_map(|q| q.drain(..)).collect();
            for id in queued {
                self.inner.settle(
                    &mut state,
                    id,
                    JobState::Cancelled,
                    Some("scheduler shut down".into()),
                    None,
                );
            }
            for entry in state.jobs.values() {
                if entry.state == JobState::Running {
                    entry.cancel.cancel();
                }
            }
        }
        loop {
            let idle = self.inner.idle.notified();
            if self.inner.state.lock().running_total == 0 {
                break;
            }
            idle.await;
        }
        info!("scheduler stopped");
    }
}

impl Inner {
    /// Start as many queued jobs as the caps allow.
    fn pump(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.shutting_down {
            return;
        }
        while let Some(id) = self.next_eligible(&mut state) {
            let Some(entry) = state.jobs.get(&id) else {
                continue;
            };
            let (kind, subject) = (entry.kind, entry.subject.clone());

            if let Some(asset) = subject.asset() {
                if let Some((settled, reason, artifact)) = self.precheck(kind, asset) {
                    debug!(job = %id, asset = %asset, state = %settled, "settled without running");
                    self.settle(&mut state, id, settled, reason, artifact);
                    continue;
                }
            }

            let cancel = match state.jobs.get_mut(&id) {
                Some(entry) => {
                    entry.state = JobState::Running;
                    entry.attempts = 1;
                    entry.cancel.clone()
                }
                None => continue,
            };
            state.running[kind.index()] += 1;
            state.running_total += 1;
            if let Some(project) = subject.project() {
                state.exporting.insert(project);
            }
            info!(job = %id, %kind, subject = %subject, "job started");
            self.emit(&state, id);

            let inner = Arc::clone(self);
            self.runtime.spawn(async move {
                let attempted = inner.run_attempts(id, kind, &subject, &cancel).await;
                inner.finish(id, kind, &subject, attempted);
            });
        }
    }

    /// Decide asset jobs whose outcome is already known from the catalog.
    /// `None` means the job should run.
    fn precheck(
        &self,
        kind: JobKind,
        asset: AssetId,
    ) -> Option<Settlement> {
        let current = self.catalog.get(asset);
        let status = current.as_ref().map_or(AssetStatus::Failed, |a| a.status);
        let not_ready = || {
            let reason = MontageError::AssetNotReady {
                asset_id: asset,
                status,
            }
            .to_string();
            Some((JobState::Failed(reason.clone()), Some(reason), None))
        };
        match (kind, status) {
            (JobKind::Probe, AssetStatus::Pending) => None,
            (JobKind::Probe, AssetStatus::Probed | AssetStatus::ProxyReady) => {
                Some((JobState::Succeeded, None, None))
            }
            (JobKind::ProxyGenerate, AssetStatus::Probed) => None,
            (JobKind::ProxyGenerate, AssetStatus::ProxyReady) => Some((
                JobState::Succeeded,
                None,
                current.and_then(|a| a.proxy_path),
            )),
            (JobKind::ExportRender, _) => None,
            _ => not_ready(),
        }
    }

    /// Pop the next job to start, serving kinds round-robin.
    fn next_eligible(&self, state: &mut State) -> Option<JobId> {
        if state.running_total >= self.config.pipeline.max_concurrency.max(1) {
            return None;
        }
        for offset in 0..JobKind::ALL.len() {
            let slot = (state.cursor + offset) % JobKind::ALL.len();
            let kind = JobKind::ALL[slot];
            if state.running[slot] >= self.config.pipeline.cap(kind) {
                continue;
            }
            let position = state.queues[slot]
                .iter()
                .position(|id| self.is_unblocked(state, *id));
            if let Some(position) = position {
                state.cursor = (slot + 1) % JobKind::ALL.len();
                return state.queues[slot].remove(position);
            }
        }
        None
    }

    /// Ordering constraints: probe before proxy per asset, one export per project.
    fn is_unblocked(&self, state: &State, id: JobId) -> bool {
        let Some(entry) = state.jobs.get(&id) else {
            return true;
        };
        match (&entry.subject, entry.kind) {
            (JobSubject::Asset(asset), JobKind::ProxyGenerate) => !state
                .live
                .contains_key(&DedupKey::Asset(*asset, JobKind::Probe)),
            (JobSubject::Export(plan), _) => !state.exporting.contains(&plan.project_id),
            _ => true,
        }
    }

    fn invocation(&self, kind: JobKind, subject: &JobSubject) -> Result<EngineInvocation, String> {
        match (kind, subject) {
            (JobKind::Probe, JobSubject::Asset(asset)) => {
                let source = self.source_path(*asset)?;
                Ok(probe_invocation(&source))
            }
            (JobKind::ProxyGenerate, JobSubject::Asset(asset)) => {
                let source = self.source_path(*asset)?;
                let output = ProxyPreset::proxy_path(&self.config.proxy_dir, *asset);
                Ok(self.config.proxy.invocation(&source, &output))
            }
            (JobKind::ExportRender, JobSubject::Export(plan)) => Ok(plan.invocation()),
            (kind, subject) => Err(format!("{kind} job cannot run on {subject}")),
        }
    }

    fn source_path(&self, asset: AssetId) -> Result<PathBuf, String> {
        self.catalog
            .get(asset)
            .map(|a| a.source_path)
            .ok_or_else(|| format!("asset {asset} is not in the catalog"))
    }

    /// Run the engine with deadline, cancellation and retries.
    async fn run_attempts(
        &self,
        id: JobId,
        kind: JobKind,
        subject: &JobSubject,
        cancel: &CancelToken,
    ) -> Attempted {
        let invocation = match self.invocation(kind, subject) {
            Ok(invocation) => invocation,
            Err(reason) => return Attempted::Failed(reason),
        };
        let deadline = self.config.pipeline.timeout(kind);
        let retry = &self.config.pipeline.retry;

        let mut attempt = 1;
        loop {
            {
                let mut state = self.state.lock();
                if let Some(entry) = state.jobs.get_mut(&id) {
                    entry.attempts = attempt;
                }
                if attempt > 1 {
                    self.emit(&state, id);
                }
            }
            debug!(job = %id, attempt, "running engine");

            // The engine future owns the child process; dropping it on
            // timeout or cancel kills the process.
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Attempted::Cancelled,
                result = tokio::time::timeout(deadline, self.engine.run(&invocation, cancel)) => result,
            };

            let err = match result {
                Ok(Ok(output)) => return Attempted::Done(output),
                Ok(Err(EngineError::Cancelled)) => return Attempted::Cancelled,
                Ok(Err(err)) => err,
                Err(_) => {
                    warn!(job = %id, attempt, ?deadline, "engine deadline exceeded");
                    return Attempted::Failed(format!("timed out after {deadline:?}"));
                }
            };

            if !retry.should_retry(attempt, err.is_transient()) {
                warn!(job = %id, attempt, error = %err, "job failed");
                return Attempted::Failed(err.to_string());
            }

            let delay = retry.delay_after(attempt);
            warn!(job = %id, attempt, error = %err, ?delay, "transient failure, retrying");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Attempted::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// Apply catalog effects, then publish the outcome and free the slot.
    fn finish(
        self: &Arc<Self>,
        id: JobId,
        kind: JobKind,
        subject: &JobSubject,
        attempted: Attempted,
    ) {
        let (state, reason, artifact) = match attempted {
            Attempted::Cancelled => (JobState::Cancelled, Some("cancelled".to_string()), None),
            Attempted::Done(output) => self.apply_success(kind, subject, &output),
            Attempted::Failed(reason) => {
                if let (JobKind::Probe, Some(asset)) = (kind, subject.asset()) {
                    self.mark_failed(asset, &reason);
                }
                (JobState::Failed(reason.clone()), Some(reason), None)
            }
        };

        {
            let mut guard = self.state.lock();
            match &state {
                JobState::Succeeded => info!(job = %id, %kind, "job succeeded"),
                JobState::Cancelled => info!(job = %id, %kind, "job cancelled"),
                other => warn!(job = %id, %kind, state = %other, "job failed"),
            }
            self.settle(&mut guard, id, state, reason, artifact);
            guard.running[kind.index()] = guard.running[kind.index()].saturating_sub(1);
            guard.running_total = guard.running_total.saturating_sub(1);
            if let Some(project) = subject.project() {
                guard.exporting.remove(&project);
            }
            if guard.running_total == 0 {
                self.idle.notify_waiters();
            }
        }
        self.pump();
    }

    fn apply_success(
        &self,
        kind: JobKind,
        subject: &JobSubject,
        output: &EngineOutput,
    ) -> Settlement {
        let failed = |reason: String| (JobState::Failed(reason.clone()), Some(reason), None);
        match (kind, subject) {
            (JobKind::Probe, JobSubject::Asset(asset)) => match parse_probe_output(&output.stdout) {
                Ok(metadata) => match self.catalog.on_probed(*asset, metadata) {
                    Ok(()) => (JobState::Succeeded, None, None),
                    Err(e) => failed(e.to_string()),
                },
                Err(e) => {
                    let reason = e.to_string();
                    self.mark_failed(*asset, &reason);
                    failed(reason)
                }
            },
            (JobKind::ProxyGenerate, JobSubject::Asset(asset)) => {
                let path = ProxyPreset::proxy_path(&self.config.proxy_dir, *asset);
                match self.catalog.on_proxy_ready(*asset, path.clone()) {
                    Ok(()) => (JobState::Succeeded, None, Some(path)),
                    Err(e) => failed(e.to_string()),
                }
            }
            (JobKind::ExportRender, JobSubject::Export(plan)) => {
                (JobState::Succeeded, None, Some(plan.output_path.clone()))
            }
            (kind, subject) => failed(format!("{kind} job cannot run on {subject}")),
        }
    }

    fn mark_failed(&self, asset: AssetId, reason: &str) {
        if let Err(e) = self.catalog.on_failed(asset, reason) {
            error!(asset = %asset, error = %e, "could not record probe failure");
        }
    }

    /// Record a terminal state and wake every handle.
    fn settle(
        &self,
        state: &mut State,
        id: JobId,
        new_state: JobState,
        reason: Option<String>,
        artifact: Option<PathBuf>,
    ) {
        let Some(entry) = state.jobs.get_mut(&id) else {
            return;
        };
        entry.state = new_state.clone();
        let key = entry.key;
        entry.outcome.send_replace(Some(JobOutcome {
            job_id: id,
            kind: entry.kind,
            state: new_state,
            reason,
            artifact,
        }));
        if state.live.get(&key) == Some(&id) {
            state.live.remove(&key);
        }
        self.emit(state, id);
    }

    fn emit(&self, state: &State, id: JobId) {
        if let Some(entry) = state.jobs.get(&id) {
            // No subscribers is fine.
            let _ = self.events.send(JobEvent {
                job_id: id,
                kind: entry.kind,
                state: entry.state.clone(),
                attempt: entry.attempts,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use montage_media::{EngineProgram, EngineResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const PROBE_JSON: &str = r#"{
        "streams": [{"codec_type": "video", "codec_name": "h264",
                     "width": 1920, "height": 1080, "r_frame_rate": "30/1"}],
        "format": {"duration": "10.0"}
    }"#;

    #[derive(Debug, Clone)]
    enum Step {
        Succeed,
        Transient,
        /// Process could not be started.
        SpawnFailure,
        Fatal,
        /// Runs until cancelled.
        Hang,
        Slow(Duration),
    }

    /// Engine that plays back a script, one step per call.
    #[derive(Default)]
    struct ScriptedEngine {
        steps: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<EngineProgram>>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedEngine {
        fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into_iter().collect()),
                ..Self::default()
            })
        }

        fn calls(&self, program: EngineProgram) -> usize {
            self.calls.lock().iter().filter(|p| **p == program).count()
        }

        fn output(invocation: &EngineInvocation) -> EngineOutput {
            let stdout = match invocation.program {
                EngineProgram::Ffprobe => PROBE_JSON.as_bytes().to_vec(),
                EngineProgram::Ffmpeg => Vec::new(),
            };
            EngineOutput {
                stdout,
                stderr_tail: String::new(),
            }
        }

        fn exit(stderr: &str) -> EngineError {
            EngineError::Exit {
                program: "ffmpeg".into(),
                code: Some(1),
                stderr_tail: stderr.into(),
            }
        }
    }

    #[async_trait]
    impl MediaEngine for ScriptedEngine {
        async fn run(
            &self,
            invocation: &EngineInvocation,
            cancel: &CancelToken,
        ) -> EngineResult<EngineOutput> {
            self.calls.lock().push(invocation.program);
            let step = self.steps.lock().pop_front().unwrap_or(Step::Succeed);
            match step {
                Step::Succeed => Ok(Self::output(invocation)),
                Step::Transient => Err(Self::exit("Resource temporarily unavailable")),
                Step::SpawnFailure => Err(EngineError::Spawn {
                    program: invocation.program.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                }),
                Step::Fatal => Err(Self::exit("Invalid data found when processing input")),
                Step::Hang => {
                    cancel.cancelled().await;
                    Err(EngineError::Cancelled)
                }
                Step::Slow(delay) => {
                    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                    self.peak.fetch_max(now, Ordering::SeqCst);
                    let result = tokio::select! {
                        _ = cancel.cancelled() => Err(EngineError::Cancelled),
                        _ = tokio::time::sleep(delay) => Ok(Self::output(invocation)),
                    };
                    self.active.fetch_sub(1, Ordering::SeqCst);
                    result
                }
            }
        }
    }

    fn config(max_concurrency: usize) -> SchedulerConfig {
        SchedulerConfig {
            pipeline: PipelineConfig {
                max_concurrency,
                probe_timeout_secs: 5,
                retry: RetryPolicy {
                    max_attempts: 3,
                    base_delay_ms: 1,
                    max_delay_ms: 4,
                },
                ..PipelineConfig::default()
            },
            proxy: ProxyPreset::default(),
            proxy_dir: PathBuf::from("/cache/proxies"),
        }
    }

    fn scheduler(engine: &Arc<ScriptedEngine>, config: SchedulerConfig) -> Scheduler {
        let engine: Arc<dyn MediaEngine> = engine.clone();
        Scheduler::new(config, engine, Arc::new(MediaCatalog::new())).unwrap()
    }

    async fn wait(scheduler: &Scheduler, job: JobId) -> JobOutcome {
        let mut handle = scheduler.subscribe(job).unwrap();
        tokio::time::timeout(Duration::from_secs(600), handle.wait())
            .await
            .expect("job did not finish")
    }

    #[test]
    fn test_new_requires_runtime() {
        let engine: Arc<dyn MediaEngine> = ScriptedEngine::new([]);
        let result = Scheduler::new(config(1), engine, Arc::new(MediaCatalog::new()));
        assert!(matches!(result, Err(PipelineError::NoRuntime)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_import_probes_then_proxies() {
        let engine = ScriptedEngine::new([]);
        let scheduler = scheduler(&engine, config(4));
        let ticket = scheduler.import("/media/a.mov").unwrap();

        let probe = wait(&scheduler, ticket.probe).await;
        assert!(probe.succeeded());
        let proxy = wait(&scheduler, ticket.proxy).await;
        assert!(proxy.succeeded());
        assert_eq!(
            proxy.artifact,
            Some(PathBuf::from("/cache/proxies/asset-000001_proxy.mp4"))
        );

        let asset = scheduler.catalog().get(ticket.asset_id).unwrap();
        assert_eq!(asset.status, AssetStatus::ProxyReady);
        assert_eq!(asset.metadata.unwrap().width, 1920);
        assert_eq!(
            *engine.calls.lock(),
            vec![EngineProgram::Ffprobe, EngineProgram::Ffmpeg]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_submission_joins_live_job() {
        let engine = ScriptedEngine::new([]);
        let scheduler = scheduler(&engine, config(4));
        let ticket = scheduler.import("/media/a.mov").unwrap();

        let again = scheduler.submit(JobRequest::proxy(ticket.asset_id)).unwrap();
        assert_eq!(again, ticket.proxy);
        let reimport = scheduler.import("/media/./a.mov").unwrap();
        assert_eq!(reimport, ticket);

        wait(&scheduler, ticket.proxy).await;
        assert_eq!(engine.calls(EngineProgram::Ffmpeg), 1);
        assert_eq!(engine.calls(EngineProgram::Ffprobe), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_asset_jobs_settle_without_running() {
        let engine = ScriptedEngine::new([]);
        let scheduler = scheduler(&engine, config(4));
        let ticket = scheduler.import("/media/a.mov").unwrap();
        wait(&scheduler, ticket.proxy).await;

        let proxy = scheduler.submit(JobRequest::proxy(ticket.asset_id)).unwrap();
        assert_ne!(proxy, ticket.proxy);
        let outcome = wait(&scheduler, proxy).await;
        assert!(outcome.succeeded());
        assert!(outcome.artifact.is_some());
        assert_eq!(engine.calls(EngineProgram::Ffmpeg), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let engine = ScriptedEngine::new([Step::Transient, Step::Transient]);
        let scheduler = scheduler(&engine, config(4));
        let ticket = scheduler.import("/media/a.mov").unwrap();

        let outcome = wait(&scheduler, ticket.probe).await;
        assert!(outcome.succeeded());
        assert_eq!(scheduler.info(ticket.probe).unwrap().attempts, 3);
        assert_eq!(engine.calls(EngineProgram::Ffprobe), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_failure_is_retried() {
        let engine = ScriptedEngine::new([Step::SpawnFailure]);
        let scheduler = scheduler(&engine, config(4));
        let ticket = scheduler.import("/media/a.mov").unwrap();

        let outcome = wait(&scheduler, ticket.probe).await;
        assert!(outcome.succeeded());
        assert_eq!(scheduler.info(ticket.probe).unwrap().attempts, 2);
        assert_eq!(engine.calls(EngineProgram::Ffprobe), 2);
        assert!(scheduler.catalog().get(ticket.asset_id).unwrap().metadata.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_fail_probe_and_proxy() {
        let engine = ScriptedEngine::new([Step::Transient, Step::Transient, Step::Transient]);
        let scheduler = scheduler(&engine, config(4));
        let ticket = scheduler.import("/media/a.mov").unwrap();

        let probe = wait(&scheduler, ticket.probe).await;
        match &probe.state {
            JobState::Failed(reason) => assert!(reason.contains("temporarily unavailable")),
            other => panic!("expected failure, got {other}"),
        }
        assert_eq!(engine.calls(EngineProgram::Ffprobe), 3);

        let asset = scheduler.catalog().get(ticket.asset_id).unwrap();
        assert_eq!(asset.status, AssetStatus::Failed);
        assert!(asset.failure.is_some());

        let proxy = wait(&scheduler, ticket.proxy).await;
        assert!(matches!(proxy.state, JobState::Failed(_)));
        assert!(proxy.reason.unwrap().contains("not ready"));
        assert_eq!(engine.calls(EngineProgram::Ffmpeg), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_not_retried() {
        let engine = ScriptedEngine::new([Step::Fatal]);
        let scheduler = scheduler(&engine, config(4));
        let ticket = scheduler.import("/media/a.mov").unwrap();

        let outcome = wait(&scheduler, ticket.probe).await;
        assert!(matches!(outcome.state, JobState::Failed(_)));
        assert_eq!(engine.calls(EngineProgram::Ffprobe), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxy_failure_keeps_asset_probed() {
        let engine = ScriptedEngine::new([Step::Succeed, Step::Fatal]);
        let scheduler = scheduler(&engine, config(4));
        let ticket = scheduler.import("/media/a.mov").unwrap();

        let proxy = wait(&scheduler, ticket.proxy).await;
        assert!(matches!(proxy.state, JobState::Failed(_)));
        assert_eq!(
            scheduler.catalog().status(ticket.asset_id),
            Some(AssetStatus::Probed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fails_without_retry() {
        let engine = ScriptedEngine::new([Step::Hang]);
        let scheduler = scheduler(&engine, config(4));
        let ticket = scheduler.import("/media/a.mov").unwrap();

        let outcome = wait(&scheduler, ticket.probe).await;
        assert_eq!(outcome.state, JobState::Failed("timed out after 5s".into()));
        assert_eq!(engine.calls(EngineProgram::Ffprobe), 1);
        assert_eq!(
            scheduler.catalog().status(ticket.asset_id),
            Some(AssetStatus::Failed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_running_job() {
        let engine = ScriptedEngine::new([Step::Hang]);
        let scheduler = scheduler(&engine, config(4));
        let ticket = scheduler.import("/media/a.mov").unwrap();
        assert_eq!(scheduler.status(ticket.probe), Some(JobState::Running));

        scheduler.cancel(ticket.probe).unwrap();
        let outcome = wait(&scheduler, ticket.probe).await;
        assert_eq!(outcome.state, JobState::Cancelled);
        assert_eq!(
            scheduler.catalog().status(ticket.asset_id),
            Some(AssetStatus::Pending)
        );

        // Cancelling a finished job changes nothing.
        scheduler.cancel(ticket.probe).unwrap();
        assert_eq!(scheduler.status(ticket.probe), Some(JobState::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_queued_job_settles_immediately() {
        let engine = ScriptedEngine::new([Step::Hang]);
        let scheduler = scheduler(&engine, config(1));
        let first = scheduler.import("/media/a.mov").unwrap();
        let second = scheduler.import("/media/b.mov").unwrap();
        assert_eq!(scheduler.status(first.probe), Some(JobState::Running));
        assert_eq!(scheduler.status(second.probe), Some(JobState::Queued));
        tokio::task::yield_now().await;

        scheduler.cancel(second.probe).unwrap();
        let handle = scheduler.subscribe(second.probe).unwrap();
        assert_eq!(handle.try_outcome().unwrap().state, JobState::Cancelled);

        scheduler.shutdown().await;
        assert_eq!(scheduler.status(first.probe), Some(JobState::Cancelled));
        assert_eq!(engine.calls(EngineProgram::Ffprobe), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_cap_respected() {
        let slow = Step::Slow(Duration::from_millis(50));
        let engine = ScriptedEngine::new(std::iter::repeat(slow).take(8));
        let scheduler = scheduler(&engine, config(2));

        let tickets: Vec<ImportTicket> = (0..4)
            .map(|i| scheduler.import(format!("/media/{i}.mov")).unwrap())
            .collect();
        for ticket in &tickets {
            assert!(wait(&scheduler, ticket.proxy).await.succeeded());
        }
        assert_eq!(engine.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handles_share_outcome() {
        let engine = ScriptedEngine::new([]);
        let scheduler = scheduler(&engine, config(2));
        let ticket = scheduler.import("/media/a.mov").unwrap();

        let mut first = scheduler.subscribe(ticket.probe).unwrap();
        let mut second = scheduler.subscribe(ticket.probe).unwrap();
        let (a, b) = tokio::join!(first.wait(), second.wait());
        assert_eq!(a, b);
        assert!(a.succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_follow_lifecycle() {
        let engine = ScriptedEngine::new([Step::Transient]);
        let scheduler = scheduler(&engine, config(2));
        let mut events = scheduler.events();
        let ticket = scheduler.import("/media/a.mov").unwrap();
        wait(&scheduler, ticket.probe).await;

        let mut probe_states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if event.job_id == ticket.probe {
                probe_states.push((event.state, event.attempt));
            }
        }
        assert_eq!(
            probe_states,
            vec![
                (JobState::Queued, 0),
                (JobState::Running, 1),
                (JobState::Running, 2),
                (JobState::Succeeded, 2),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledge() {
        let engine = ScriptedEngine::new([Step::Hang]);
        let scheduler = scheduler(&engine, config(2));
        let ticket = scheduler.import("/media/a.mov").unwrap();

        assert!(matches!(
            scheduler.acknowledge(ticket.probe),
            Err(PipelineError::NotTerminal { .. })
        ));
        scheduler.cancel(ticket.probe).unwrap();
        wait(&scheduler, ticket.probe).await;

        let outcome = scheduler.acknowledge(ticket.probe).unwrap();
        assert_eq!(outcome.state, JobState::Cancelled);
        assert!(scheduler.status(ticket.probe).is_none());
        assert!(matches!(
            scheduler.acknowledge(ticket.probe),
            Err(PipelineError::UnknownJob(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_asset_and_shutdown_rejections() {
        let engine = ScriptedEngine::new([]);
        let scheduler = scheduler(&engine, config(2));
        assert!(matches!(
            scheduler.submit(JobRequest::probe(AssetId::from_raw(99))),
            Err(PipelineError::Montage(MontageError::NotFound(_)))
        ));

        scheduler.shutdown().await;
        assert!(matches!(
            scheduler.import("/media/a.mov"),
            Err(PipelineError::ShuttingDown)
        ));
    }
}
