//! Pipeline service wiring shared by the commands.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use montage_media::FfmpegEngine;
use montage_pipeline::{
    JobHandle, JobRequest, MediaCatalog, MontageConfig, Scheduler, SchedulerConfig,
};
use montage_timeline::{Project, ProjectFile};
use tracing::{info, warn};

pub struct Session {
    pub config: MontageConfig,
    pub scheduler: Scheduler,
}

impl Session {
    pub fn start(config: MontageConfig) -> anyhow::Result<Self> {
        let engine = FfmpegEngine::new(
            config.engine.ffmpeg_path.as_deref(),
            config.engine.ffprobe_path.as_deref(),
        )?;
        let scheduler = Scheduler::new(
            SchedulerConfig::from_config(&config),
            Arc::new(engine),
            Arc::new(MediaCatalog::new()),
        )?;
        Ok(Self { config, scheduler })
    }

    pub fn catalog(&self) -> &MediaCatalog {
        self.scheduler.catalog()
    }

    /// Load a project file and bring its media into the catalog.
    ///
    /// Every media entry is probed (and proxied when `proxies` is set) before
    /// returning; clip references are rewritten to the fresh catalog ids.
    pub async fn open_project(&self, path: &Path, proxies: bool) -> anyhow::Result<Project> {
        let file = ProjectFile::load_from_file(path)
            .with_context(|| format!("failed to load project {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut mapping = HashMap::new();
        let mut pending = Vec::new();
        for entry in &file.media {
            let source = resolve(base, &entry.path);
            let (asset_id, job) = if proxies {
                let ticket = self.scheduler.import(&source)?;
                (ticket.asset_id, ticket.proxy)
            } else {
                let asset_id = self.catalog().register_asset(&source)?;
                (asset_id, self.scheduler.submit(JobRequest::probe(asset_id))?)
            };
            mapping.insert(entry.asset_id, asset_id);
            pending.push(self.scheduler.subscribe(job)?);
        }

        wait_all(pending).await;

        let mut project = file.project;
        project.remap_assets(&mapping);
        info!(
            project = %project.name,
            tracks = project.tracks().len(),
            media = mapping.len(),
            "project opened"
        );
        Ok(project)
    }
}

/// Wait for every handle; failures are logged and left to the caller to surface.
pub async fn wait_all(handles: Vec<JobHandle>) {
    for mut handle in handles {
        let outcome = handle.wait().await;
        if !outcome.succeeded() {
            warn!(
                job = %outcome.job_id,
                kind = %outcome.kind,
                reason = outcome.reason.as_deref().unwrap_or("unknown"),
                "media job did not succeed"
            );
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
