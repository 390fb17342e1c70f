//! Integration tests for the timeline model.
//!
//! Exercises cross-crate interactions between montage-core,
//! montage-timeline, and the montage-media export planner.

use std::collections::HashMap;
use std::path::PathBuf;

use montage_core::{
    AssetId, AssetStatus, FrameRate, Interpolation, Keyframe, MediaAsset, MediaMetadata,
    MontageError,
};
use montage_media::{plan, ExportSettings};
use montage_timeline::{
    ClipSpec, EditCommand, Project, ProjectFile, PropertyName, TimelineDocument, TrackKind,
};
use uuid::Uuid;

// ── Helpers ────────────────────────────────────────────────────

type Assets = HashMap<AssetId, MediaAsset>;

fn asset(raw: u64, path: &str, status: AssetStatus) -> MediaAsset {
    let mut asset = MediaAsset::new(AssetId::from_raw(raw), PathBuf::from(path));
    asset.status = status;
    if status.is_probed() {
        asset.metadata = Some(MediaMetadata {
            duration: 120.0,
            width: 1920,
            height: 1080,
            frame_rate: FrameRate::FPS_30,
            codec: "h264".into(),
            audio_codec: Some("aac".into()),
        });
    }
    asset
}

fn assets() -> Assets {
    [
        asset(1, "/media/a.mov", AssetStatus::Probed),
        asset(2, "/media/music.wav", AssetStatus::Probed),
    ]
    .into_iter()
    .map(|a| (a.id, a))
    .collect()
}

const A: AssetId = AssetId::from_raw(1);
const MUSIC: AssetId = AssetId::from_raw(2);

fn project_with_tracks() -> (Project, Uuid, Uuid) {
    let mut project = Project::new("Integration Test Project").with_frame_rate(FrameRate::FPS_30);
    let video = project.add_track(TrackKind::Video, "V1");
    let audio = project.add_track(TrackKind::Audio, "A1");
    (project, video, audio)
}

// ── Curves through the timeline ────────────────────────────────

#[test]
fn opacity_ramp_evaluates_at_clip_local_time() {
    let assets = assets();
    let (mut project, video, _) = project_with_tracks();
    let clip = project
        .add_clip(video, ClipSpec::new(A, 0.0, 5.0).with_source_in(10.0), &assets)
        .unwrap();
    project
        .set_keyframe(clip, PropertyName::Opacity, Keyframe::new(0.0, 0.0))
        .unwrap();
    project
        .set_keyframe(clip, PropertyName::Opacity, Keyframe::new(5.0, 1.0))
        .unwrap();

    let opacity = project.clip(clip).unwrap().property(&PropertyName::Opacity).unwrap();
    assert!((opacity.evaluate(2.5) - 0.5).abs() < 1e-12);

    // Playback time 0 maps to clip-local 10, past the last keyframe.
    let at_start = project
        .evaluate_property(clip, &PropertyName::Opacity, 0.0)
        .unwrap();
    assert_eq!(at_start, 1.0);
}

#[test]
fn sample_at_reports_active_clips_only() {
    let assets = assets();
    let (mut project, video, audio) = project_with_tracks();
    let shot = project
        .add_clip(video, ClipSpec::new(A, 0.0, 4.0), &assets)
        .unwrap();
    let music = project
        .add_clip(audio, ClipSpec::new(MUSIC, 2.0, 10.0), &assets)
        .unwrap();
    project
        .set_keyframe(
            shot,
            PropertyName::Scale,
            Keyframe::with_interpolation(0.0, 1.0, Interpolation::Hold),
        )
        .unwrap();
    project
        .set_keyframe(music, PropertyName::Volume, Keyframe::new(0.0, 0.8))
        .unwrap();

    let early = project.sample_at(1.0);
    assert_eq!(early.len(), 1);
    assert_eq!(early[0].clip_id, shot);

    let both = project.sample_at(3.0);
    assert_eq!(both.len(), 2);

    let late = project.sample_at(6.0);
    assert_eq!(late.len(), 1);
    assert_eq!(late[0].property, PropertyName::Volume);
    assert_eq!(late[0].value, 0.8);
}

// ── Edits ──────────────────────────────────────────────────────

#[test]
fn overlapping_add_leaves_track_unchanged() {
    let assets = assets();
    let (mut project, video, _) = project_with_tracks();
    project
        .add_clip(video, ClipSpec::new(A, 0.0, 5.0), &assets)
        .unwrap();
    let before = project.clone();

    let err = project
        .add_clip(video, ClipSpec::new(A, 4.0, 2.0), &assets)
        .unwrap_err();
    assert!(matches!(err, MontageError::TimelineConflict(_)));
    assert_eq!(project, before);
}

#[test]
fn unprobed_asset_cannot_be_placed() {
    let mut assets = assets();
    let pending = asset(3, "/media/new.mov", AssetStatus::Pending);
    assets.insert(pending.id, pending);
    let (mut project, video, _) = project_with_tracks();

    let err = project
        .add_clip(video, ClipSpec::new(AssetId::from_raw(3), 0.0, 1.0), &assets)
        .unwrap_err();
    assert!(matches!(
        err,
        MontageError::AssetNotReady {
            status: AssetStatus::Pending,
            ..
        }
    ));
}

#[test]
fn add_then_remove_restores_project() {
    let assets = assets();
    let (mut project, video, _) = project_with_tracks();
    project
        .add_clip(video, ClipSpec::new(A, 0.0, 2.0), &assets)
        .unwrap();
    let before = project.clone();

    let clip = project
        .add_clip(video, ClipSpec::new(A, 5.0, 2.0), &assets)
        .unwrap();
    let removed = project.remove_clip(clip).unwrap();
    assert_eq!(removed.id, clip);
    assert_eq!(project, before);
}

#[test]
fn document_undo_redo_across_edit_kinds() {
    let assets = assets();
    let (project, video, _) = project_with_tracks();
    let mut doc = TimelineDocument::new(project);
    let original = doc.snapshot();

    let add = EditCommand::add_clip(video, ClipSpec::new(A, 0.0, 6.0));
    let EditCommand::AddClip { clip } = &add else {
        unreachable!()
    };
    let clip_id = clip.id;
    doc.apply(add, &assets).unwrap();
    doc.apply(
        EditCommand::Batch(vec![
            EditCommand::MoveClip {
                clip_id,
                track_id: video,
                start: 3.0,
            },
            EditCommand::TrimClip {
                clip_id,
                source_in: 1.0,
                duration: 4.0,
            },
        ]),
        &assets,
    )
    .unwrap();

    let clip = doc.project().clip(clip_id).unwrap();
    assert_eq!((clip.start_time, clip.source_in_offset, clip.duration), (3.0, 1.0, 4.0));

    assert!(doc.undo(&assets).unwrap());
    let clip = doc.project().clip(clip_id).unwrap();
    assert_eq!((clip.start_time, clip.source_in_offset, clip.duration), (0.0, 0.0, 6.0));

    assert!(doc.undo(&assets).unwrap());
    assert_eq!(*doc.project(), *original);
    assert!(!doc.undo(&assets).unwrap());

    assert!(doc.redo(&assets).unwrap());
    assert!(doc.redo(&assets).unwrap());
    assert_eq!(doc.project().clip(clip_id).unwrap().start_time, 3.0);
}

// ── Persistence ────────────────────────────────────────────────

#[test]
fn project_file_roundtrip_and_remap() {
    let assets = assets();
    let (mut project, video, audio) = project_with_tracks();
    let clip = project
        .add_clip(video, ClipSpec::new(A, 0.0, 5.0), &assets)
        .unwrap();
    project
        .add_clip(audio, ClipSpec::new(MUSIC, 0.0, 5.0), &assets)
        .unwrap();
    project
        .set_keyframe(
            clip,
            PropertyName::Custom("blur".into()),
            Keyframe::with_interpolation(1.0, 4.0, Interpolation::bezier(0.25, 0.0, 0.75, 1.0)),
        )
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edit.montage.json");
    let media = assets.values().map(|a| (a.id, a.source_path.clone()));
    ProjectFile::new(project.clone())
        .with_media(media)
        .save_to_file(&path)
        .unwrap();

    let loaded = ProjectFile::load_from_file(&path).unwrap();
    assert_eq!(loaded.project, project);
    assert_eq!(loaded.media.len(), 2);

    // A fresh catalog hands out different ids for the same files.
    let mapping: HashMap<AssetId, AssetId> = loaded
        .media
        .iter()
        .map(|entry| (entry.asset_id, AssetId::from_raw(entry.asset_id.raw() + 100)))
        .collect();
    let mut reopened = loaded.project;
    reopened.remap_assets(&mapping);
    assert_eq!(
        reopened.referenced_assets(),
        vec![AssetId::from_raw(101), AssetId::from_raw(102)]
    );
}

#[test]
fn project_file_without_media_entry_rejected() {
    let assets = assets();
    let (mut project, video, _) = project_with_tracks();
    project
        .add_clip(video, ClipSpec::new(A, 0.0, 5.0), &assets)
        .unwrap();
    let json = ProjectFile::new(project).to_json().unwrap();
    assert!(ProjectFile::from_json(&json).is_err());
}

// ── Export planning ────────────────────────────────────────────

#[test]
fn export_samples_curves_per_output_frame() {
    let assets = assets();
    let (mut project, video, audio) = project_with_tracks();
    let clip = project
        .add_clip(video, ClipSpec::new(A, 0.0, 5.0), &assets)
        .unwrap();
    project
        .add_clip(audio, ClipSpec::new(MUSIC, 0.0, 5.0), &assets)
        .unwrap();
    project
        .set_keyframe(clip, PropertyName::Opacity, Keyframe::new(0.0, 0.0))
        .unwrap();
    project
        .set_keyframe(clip, PropertyName::Opacity, Keyframe::new(5.0, 1.0))
        .unwrap();

    let settings = ExportSettings {
        composite: true,
        output_dir: PathBuf::from("/renders"),
        ..ExportSettings::default()
    };
    let plan = plan(&project, &settings, &assets).unwrap();

    assert_eq!(plan.segments.len(), 2);
    assert_eq!(plan.total_frames(), 150);
    let video_segment = &plan.segments[0];
    assert_eq!(video_segment.track_kind, TrackKind::Video);
    let opacity = &video_segment.properties[&PropertyName::Opacity];
    assert_eq!(opacity.len(), 150);
    assert_eq!(opacity[0], 0.0);
    assert!((opacity[75] - 0.5).abs() < 1e-9);

    let audio_segment = &plan.segments[1];
    assert_eq!(audio_segment.properties[&PropertyName::Volume], vec![1.0; 150]);
    assert!(plan.output_path.starts_with("/renders"));
    assert!(plan
        .output_path
        .to_string_lossy()
        .ends_with(&format!("_{}.mp4", plan.fingerprint_hex8())));
}

#[test]
fn export_with_pending_asset_reports_every_blocker() {
    let mut assets = assets();
    let (mut project, video, audio) = project_with_tracks();
    project
        .add_clip(video, ClipSpec::new(A, 0.0, 5.0), &assets)
        .unwrap();
    project
        .add_clip(audio, ClipSpec::new(MUSIC, 0.0, 5.0), &assets)
        .unwrap();

    // Both files were re-registered and not probed yet.
    for asset in assets.values_mut() {
        asset.status = AssetStatus::Pending;
    }
    match plan(&project, &ExportSettings::default(), &assets) {
        Err(MontageError::IncompleteAssets { asset_ids }) => {
            assert_eq!(asset_ids, vec![A, MUSIC]);
        }
        other => panic!("expected IncompleteAssets, got {other:?}"),
    }
}

#[test]
fn identical_plans_share_fingerprint() {
    let assets = assets();
    let (mut project, video, _) = project_with_tracks();
    project
        .add_clip(video, ClipSpec::new(A, 0.0, 5.0), &assets)
        .unwrap();
    let settings = ExportSettings::default();

    let first = plan(&project, &settings, &assets).unwrap();
    let second = plan(&project, &settings, &assets).unwrap();
    assert_eq!(first.fingerprint, second.fingerprint);

    let faster = ExportSettings {
        bitrate: "2500k".into(),
        ..settings
    };
    assert_ne!(first.fingerprint, plan(&project, &faster, &assets).unwrap().fingerprint);
}
