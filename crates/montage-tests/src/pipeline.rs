//! End-to-end tests: catalog, scheduler, timeline and export planning
//! against the in-process engine.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use montage_core::{
    AssetId, AssetStatus, FrameRate, Keyframe, MediaAsset, MediaMetadata, MontageError,
};
use montage_media::{plan, EngineProgram, ExportSettings, MediaEngine, ProxyPreset};
use montage_pipeline::{
    JobKind, JobRequest, JobState, MediaCatalog, PipelineConfig, RetryPolicy, Scheduler,
    SchedulerConfig,
};
use montage_timeline::{ClipSpec, EditCommand, Project, PropertyName, TimelineDocument, TrackKind};

use crate::engine::{FakeEngine, Reply};

fn config() -> SchedulerConfig {
    SchedulerConfig {
        pipeline: PipelineConfig {
            max_concurrency: 4,
            export_concurrency: Some(2),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 10,
                max_delay_ms: 100,
            },
            ..PipelineConfig::default()
        },
        proxy: ProxyPreset::default(),
        proxy_dir: PathBuf::from("/cache/proxies"),
    }
}

fn start(engine: &Arc<FakeEngine>) -> Scheduler {
    let engine: Arc<dyn MediaEngine> = engine.clone();
    Scheduler::new(config(), engine, Arc::new(MediaCatalog::new())).unwrap()
}

fn export_settings() -> ExportSettings {
    ExportSettings {
        output_dir: PathBuf::from("/renders"),
        ..ExportSettings::default()
    }
}

#[tokio::test(start_paused = true)]
async fn import_edit_and_export() {
    let engine = FakeEngine::new();
    let scheduler = start(&engine);

    let ticket = scheduler.import("/media/a.mov").unwrap();
    let mut proxy = scheduler.subscribe(ticket.proxy).unwrap();
    assert!(proxy.wait().await.succeeded());

    let catalog = scheduler.catalog().clone();
    let asset = catalog.get(ticket.asset_id).unwrap();
    assert_eq!(asset.status, AssetStatus::ProxyReady);
    assert_eq!(asset.duration(), Some(120.0));

    let mut doc = TimelineDocument::new(Project::new("Trailer Cut"));
    doc.apply(EditCommand::add_track(TrackKind::Video, "V1"), &*catalog)
        .unwrap();
    let track = doc.project().tracks()[0].id;
    let spec = ClipSpec::new(ticket.asset_id, 0.0, 5.0).with_source_in(10.0);
    let add = EditCommand::add_clip(track, spec);
    let EditCommand::AddClip { clip } = &add else {
        unreachable!()
    };
    let clip_id = clip.id;
    doc.apply(add, &*catalog).unwrap();
    doc.apply(
        EditCommand::SetKeyframe {
            clip_id,
            property: PropertyName::Opacity,
            keyframe: Keyframe::new(0.0, 0.0),
        },
        &*catalog,
    )
    .unwrap();

    // Plans are built from a snapshot; later edits do not leak in.
    let snapshot = doc.snapshot();
    let export = plan(&snapshot, &export_settings(), &*catalog).unwrap();
    let job = scheduler.submit(JobRequest::export(export.clone())).unwrap();
    assert_eq!(scheduler.submit(JobRequest::export(export.clone())).unwrap(), job);

    let outcome = scheduler.subscribe(job).unwrap().wait().await;
    assert!(outcome.succeeded());
    assert_eq!(outcome.kind, JobKind::ExportRender);
    assert_eq!(outcome.artifact.as_ref(), Some(&export.output_path));

    let renders = engine.invocations(EngineProgram::Ffmpeg);
    let render = renders.last().unwrap();
    assert_eq!(render.output.as_ref(), Some(&export.output_path));
    assert!(render.args.iter().any(|a| a == "/media/a.mov"));
    assert!(render.args.windows(2).any(|w| w[0] == "-ss" && w[1] == "10.000"));
}

#[tokio::test(start_paused = true)]
async fn export_with_pending_asset_creates_no_job() {
    let engine = FakeEngine::scripted([Reply::Hang]);
    let scheduler = start(&engine);

    // Placed in an earlier session, when the file was already probed.
    let mut earlier = MediaAsset::new(AssetId::from_raw(1), PathBuf::from("/media/a.mov"));
    earlier.status = AssetStatus::Probed;
    earlier.metadata = Some(MediaMetadata {
        duration: 120.0,
        width: 1920,
        height: 1080,
        frame_rate: FrameRate::FPS_30,
        codec: "h264".into(),
        audio_codec: None,
    });
    let lookup = HashMap::from([(earlier.id, earlier)]);
    let mut project = Project::new("Pending");
    let video = project.add_track(TrackKind::Video, "V1");
    project
        .add_clip(video, ClipSpec::new(AssetId::from_raw(1), 0.0, 5.0), &lookup)
        .unwrap();

    // The live catalog is still probing it.
    let ticket = scheduler.import("/media/a.mov").unwrap();
    assert_eq!(ticket.asset_id, AssetId::from_raw(1));
    assert_eq!(scheduler.status(ticket.probe), Some(JobState::Running));

    let jobs_before = scheduler.list().len();
    match plan(&project, &export_settings(), &**scheduler.catalog()) {
        Err(MontageError::IncompleteAssets { asset_ids }) => {
            assert_eq!(asset_ids, vec![ticket.asset_id]);
        }
        other => panic!("expected IncompleteAssets, got {other:?}"),
    }
    assert_eq!(scheduler.list().len(), jobs_before);
    assert!(scheduler
        .list()
        .iter()
        .all(|job| job.kind != JobKind::ExportRender));

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn exports_of_one_project_run_one_at_a_time() {
    let engine = FakeEngine::scripted([
        Reply::Ok,
        Reply::Ok,
        Reply::Delay(Duration::from_secs(30)),
        Reply::Delay(Duration::from_secs(30)),
    ]);
    let scheduler = start(&engine);
    let ticket = scheduler.import("/media/a.mov").unwrap();
    scheduler.subscribe(ticket.proxy).unwrap().wait().await;

    let catalog = scheduler.catalog().clone();
    let mut project = Project::new("Serial");
    let video = project.add_track(TrackKind::Video, "V1");
    project
        .add_clip(video, ClipSpec::new(ticket.asset_id, 0.0, 5.0), &*catalog)
        .unwrap();

    let high = plan(&project, &export_settings(), &*catalog).unwrap();
    let low = plan(
        &project,
        &ExportSettings {
            bitrate: "2M".into(),
            ..export_settings()
        },
        &*catalog,
    )
    .unwrap();
    assert_ne!(high.output_path, low.output_path);

    let first = scheduler.submit(JobRequest::export(high)).unwrap();
    let second = scheduler.submit(JobRequest::export(low)).unwrap();
    assert_eq!(scheduler.status(first), Some(JobState::Running));
    assert_eq!(scheduler.status(second), Some(JobState::Queued));

    assert!(scheduler.subscribe(first).unwrap().wait().await.succeeded());
    assert!(scheduler.subscribe(second).unwrap().wait().await.succeeded());
    assert_eq!(engine.invocations(EngineProgram::Ffmpeg).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn proxy_recovers_from_transient_io_errors() {
    let engine = FakeEngine::scripted([Reply::Ok, Reply::IoError, Reply::IoError]);
    let scheduler = start(&engine);
    let ticket = scheduler.import("/media/a.mov").unwrap();

    let outcome = scheduler.subscribe(ticket.proxy).unwrap().wait().await;
    assert!(outcome.succeeded());
    assert_eq!(scheduler.info(ticket.proxy).unwrap().attempts, 3);
    assert_eq!(engine.invocations(EngineProgram::Ffmpeg).len(), 3);
    assert_eq!(
        scheduler.catalog().status(ticket.asset_id),
        Some(AssetStatus::ProxyReady)
    );
}

#[tokio::test(start_paused = true)]
async fn proxy_gives_up_after_retry_cap() {
    let engine = FakeEngine::scripted([
        Reply::Ok,
        Reply::IoError,
        Reply::IoError,
        Reply::IoError,
        Reply::IoError,
    ]);
    let scheduler = start(&engine);
    let ticket = scheduler.import("/media/a.mov").unwrap();

    let outcome = scheduler.subscribe(ticket.proxy).unwrap().wait().await;
    match &outcome.state {
        JobState::Failed(reason) => {
            assert!(reason.contains("Input/output error"));
            assert_eq!(outcome.reason.as_ref(), Some(reason));
        }
        other => panic!("expected failure, got {other}"),
    }
    assert_eq!(engine.invocations(EngineProgram::Ffmpeg).len(), 3);

    // The asset keeps its last good state.
    assert_eq!(
        scheduler.catalog().status(ticket.asset_id),
        Some(AssetStatus::Probed)
    );
}

#[tokio::test(start_paused = true)]
async fn transient_export_failures_retry_then_give_up() {
    let engine = FakeEngine::scripted([
        Reply::Ok,
        Reply::Ok,
        Reply::Transient,
        Reply::Transient,
        Reply::Transient,
    ]);
    let scheduler = start(&engine);
    let ticket = scheduler.import("/media/a.mov").unwrap();
    scheduler.subscribe(ticket.proxy).unwrap().wait().await;

    let catalog = scheduler.catalog().clone();
    let mut project = Project::new("Flaky");
    let video = project.add_track(TrackKind::Video, "V1");
    project
        .add_clip(video, ClipSpec::new(ticket.asset_id, 0.0, 5.0), &*catalog)
        .unwrap();
    let export = plan(&project, &export_settings(), &*catalog).unwrap();

    let job = scheduler.submit(JobRequest::export(export)).unwrap();
    let outcome = scheduler.subscribe(job).unwrap().wait().await;
    match outcome.state {
        JobState::Failed(reason) => assert!(reason.contains("Connection reset")),
        other => panic!("expected failure, got {other}"),
    }
    assert_eq!(scheduler.info(job).unwrap().attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn reimport_after_failed_probe_gets_fresh_attempt() {
    let engine = FakeEngine::scripted([Reply::Fatal]);
    let scheduler = start(&engine);

    let first = scheduler.import("/media/broken.mov").unwrap();
    let probe = scheduler.subscribe(first.probe).unwrap().wait().await;
    assert!(matches!(probe.state, JobState::Failed(_)));
    let proxy = scheduler.subscribe(first.proxy).unwrap().wait().await;
    assert!(matches!(proxy.state, JobState::Failed(_)));
    assert_eq!(
        scheduler.catalog().status(first.asset_id),
        Some(AssetStatus::Failed)
    );

    let second = scheduler.import("/media/broken.mov").unwrap();
    assert_eq!(second.asset_id, first.asset_id);
    assert_ne!(second.probe, first.probe);
    assert!(scheduler.subscribe(second.proxy).unwrap().wait().await.succeeded());

    let asset = scheduler.catalog().get(first.asset_id).unwrap();
    assert_eq!(asset.status, AssetStatus::ProxyReady);
    assert_eq!(asset.attempt, 2);
    assert!(asset.failure.is_none());
}
