//! The project: tracks, clips and the edit operations that keep them consistent.
//!
//! Every mutation validates completely before touching any state, so a
//! rejected edit leaves the project exactly as it was.

use montage_core::{
    AssetId, AssetLookup, FrameRate, Keyframe, MediaAsset, MontageError, Result, TimeRange,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::clip::{Clip, ClipSpec, PropertyName};
use crate::track::{Track, TrackKind};

/// Slack for float comparisons against probed source durations.
const SOURCE_EPSILON: f64 = 1e-9;

/// A project: ordered tracks plus the frame rate used for playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Unique project ID
    pub id: Uuid,
    /// Project name
    pub name: String,
    /// Timeline frame rate
    pub frame_rate: FrameRate,
    /// Tracks, composited bottom (index 0) to top
    pub(crate) tracks: Vec<Track>,
}

/// Value of one property of one clip at a playback time.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySample {
    pub track_id: Uuid,
    pub clip_id: Uuid,
    pub property: PropertyName,
    pub value: f64,
}

impl Project {
    /// Create a new empty project.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            frame_rate: FrameRate::FPS_30,
            tracks: Vec::new(),
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: FrameRate) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, track_id: Uuid) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == track_id)
    }

    /// Locate a clip anywhere in the project.
    pub fn clip(&self, clip_id: Uuid) -> Option<&Clip> {
        self.tracks
            .iter()
            .find_map(|t| t.find_clip(clip_id).map(|(_, c)| c))
    }

    /// Derived global duration: latest clip end across all tracks.
    pub fn duration(&self) -> f64 {
        self.tracks
            .iter()
            .map(Track::duration)
            .fold(0.0, f64::max)
    }

    /// Every asset referenced by a clip, in first-use order.
    pub fn referenced_assets(&self) -> Vec<AssetId> {
        let mut seen = Vec::new();
        for clip in self.tracks.iter().flat_map(|t| t.clips()) {
            if !seen.contains(&clip.asset_id) {
                seen.push(clip.asset_id);
            }
        }
        seen
    }

    // ── Tracks ──────────────────────────────────────────────────

    /// Append a new track and return its id.
    pub fn add_track(&mut self, kind: TrackKind, name: impl Into<String>) -> Uuid {
        let track = Track::new(kind, name);
        let id = track.id;
        self.tracks.push(track);
        id
    }

    /// Insert an existing track at `index` (clamped), e.g. when undoing a removal.
    pub(crate) fn insert_track(&mut self, index: usize, track: Track) -> Result<()> {
        if self.track(track.id).is_some() {
            return Err(MontageError::TimelineConflict(format!(
                "track {} already exists",
                track.id
            )));
        }
        let index = index.min(self.tracks.len());
        self.tracks.insert(index, track);
        Ok(())
    }

    /// Remove a track with all its clips. Returns (index, track).
    pub fn remove_track(&mut self, track_id: Uuid) -> Result<(usize, Track)> {
        let index = self
            .tracks
            .iter()
            .position(|t| t.id == track_id)
            .ok_or_else(|| MontageError::NotFound(format!("track {track_id}")))?;
        if self.tracks[index].locked {
            return Err(MontageError::TimelineConflict(format!(
                "track {track_id} is locked"
            )));
        }
        Ok((index, self.tracks.remove(index)))
    }

    pub fn set_track_locked(&mut self, track_id: Uuid, locked: bool) -> Result<()> {
        self.track_mut(track_id)?.locked = locked;
        Ok(())
    }

    pub fn set_track_muted(&mut self, track_id: Uuid, muted: bool) -> Result<()> {
        self.track_mut(track_id)?.muted = muted;
        Ok(())
    }

    fn track_mut(&mut self, track_id: Uuid) -> Result<&mut Track> {
        self.tracks
            .iter_mut()
            .find(|t| t.id == track_id)
            .ok_or_else(|| MontageError::NotFound(format!("track {track_id}")))
    }

    fn editable_track(&self, track_id: Uuid) -> Result<&Track> {
        let track = self
            .track(track_id)
            .ok_or_else(|| MontageError::NotFound(format!("track {track_id}")))?;
        if track.locked {
            return Err(MontageError::TimelineConflict(format!(
                "track {} ({}) is locked",
                track.name, track_id
            )));
        }
        Ok(track)
    }

    fn locate(&self, clip_id: Uuid) -> Result<(usize, &Clip)> {
        self.tracks
            .iter()
            .enumerate()
            .find_map(|(ti, t)| t.find_clip(clip_id).map(|(_, c)| (ti, c)))
            .ok_or_else(|| MontageError::NotFound(format!("clip {clip_id}")))
    }

    // ── Clips ───────────────────────────────────────────────────

    /// Place a new clip on a track.
    ///
    /// Fails with `AssetNotReady` while the asset has not been probed and with
    /// `TimelineConflict` when the clip would overlap a neighbour or run past
    /// the end of its source.
    pub fn add_clip(
        &mut self,
        track_id: Uuid,
        spec: ClipSpec,
        assets: &dyn AssetLookup,
    ) -> Result<Uuid> {
        let clip = Clip::from_spec(track_id, spec);
        let id = clip.id;
        self.insert_clip(clip, assets)?;
        Ok(id)
    }

    /// Insert a fully built clip on `clip.track_id` after validation.
    pub(crate) fn insert_clip(&mut self, clip: Clip, assets: &dyn AssetLookup) -> Result<()> {
        if self.clip(clip.id).is_some() {
            return Err(MontageError::TimelineConflict(format!(
                "clip {} already exists",
                clip.id
            )));
        }
        self.validate_placement(
            clip.track_id,
            None,
            clip.asset_id,
            clip.start_time,
            clip.duration,
            clip.source_in_offset,
            assets,
        )?;
        debug!(clip = %clip.id, track = %clip.track_id, start = clip.start_time, "Clip added");
        self.track_mut(clip.track_id)?.insert_sorted(clip);
        Ok(())
    }

    /// Move a clip to `new_start` on its current track.
    pub fn move_clip(&mut self, clip_id: Uuid, new_start: f64, assets: &dyn AssetLookup) -> Result<()> {
        let (track_idx, _) = self.locate(clip_id)?;
        let track_id = self.tracks[track_idx].id;
        self.move_clip_to(clip_id, track_id, new_start, assets)
    }

    /// Move a clip to `new_start` on `track_id` (possibly a different track).
    pub fn move_clip_to(
        &mut self,
        clip_id: Uuid,
        track_id: Uuid,
        new_start: f64,
        assets: &dyn AssetLookup,
    ) -> Result<()> {
        let (src_idx, clip) = self.locate(clip_id)?;
        let src_id = self.tracks[src_idx].id;
        self.editable_track(src_id)?;
        self.validate_placement(
            track_id,
            Some(clip_id),
            clip.asset_id,
            new_start,
            clip.duration,
            clip.source_in_offset,
            assets,
        )?;

        let mut clip = self.tracks[src_idx]
            .take_clip(clip_id)
            .ok_or_else(|| MontageError::Internal(format!("clip {clip_id} vanished")))?;
        clip.start_time = new_start;
        clip.track_id = track_id;
        self.track_mut(track_id)?.insert_sorted(clip);
        debug!(clip = %clip_id, track = %track_id, start = new_start, "Clip moved");
        Ok(())
    }

    /// Change a clip's source in point and duration; its timeline start stays put.
    pub fn trim_clip(
        &mut self,
        clip_id: Uuid,
        new_in: f64,
        new_duration: f64,
        assets: &dyn AssetLookup,
    ) -> Result<()> {
        let (track_idx, clip) = self.locate(clip_id)?;
        let track_id = self.tracks[track_idx].id;
        self.validate_placement(
            track_id,
            Some(clip_id),
            clip.asset_id,
            clip.start_time,
            new_duration,
            new_in,
            assets,
        )?;

        let clip = self.tracks[track_idx]
            .find_clip_mut(clip_id)
            .ok_or_else(|| MontageError::Internal(format!("clip {clip_id} vanished")))?;
        clip.source_in_offset = new_in;
        clip.duration = new_duration;
        debug!(clip = %clip_id, source_in = new_in, duration = new_duration, "Clip trimmed");
        Ok(())
    }

    /// Remove a clip and hand it back.
    pub fn remove_clip(&mut self, clip_id: Uuid) -> Result<Clip> {
        let (track_idx, _) = self.locate(clip_id)?;
        let track_id = self.tracks[track_idx].id;
        self.editable_track(track_id)?;
        self.tracks[track_idx]
            .take_clip(clip_id)
            .ok_or_else(|| MontageError::Internal(format!("clip {clip_id} vanished")))
    }

    pub fn set_clip_enabled(&mut self, clip_id: Uuid, enabled: bool) -> Result<()> {
        self.editable_clip_mut(clip_id)?.enabled = enabled;
        Ok(())
    }

    // ── Keyframes ───────────────────────────────────────────────

    /// Insert or replace a keyframe (clip-local time). Returns the replaced keyframe.
    pub fn set_keyframe(
        &mut self,
        clip_id: Uuid,
        property: PropertyName,
        keyframe: Keyframe,
    ) -> Result<Option<Keyframe>> {
        self.editable_clip_mut(clip_id)?
            .set_keyframe(property, keyframe)
    }

    /// Remove the keyframe at exactly `time`.
    pub fn remove_keyframe(
        &mut self,
        clip_id: Uuid,
        property: &PropertyName,
        time: f64,
    ) -> Result<Keyframe> {
        self.editable_clip_mut(clip_id)?
            .remove_keyframe(property, time)
            .ok_or_else(|| {
                MontageError::NotFound(format!("no {property} keyframe at {time}s on clip {clip_id}"))
            })
    }

    /// Retime a keyframe. Returns whatever keyframe previously sat at `to`.
    pub fn move_keyframe(
        &mut self,
        clip_id: Uuid,
        property: &PropertyName,
        from: f64,
        to: f64,
    ) -> Result<Option<Keyframe>> {
        let clip = self.editable_clip_mut(clip_id)?;
        let prop = clip.properties.get_mut(property).ok_or_else(|| {
            MontageError::NotFound(format!("clip {clip_id} has no {property} keyframes"))
        })?;
        let replaced = prop.keyframes().iter().find(|kf| kf.time == to).copied();
        prop.move_keyframe(from, to)?;
        Ok(replaced.filter(|_| from != to))
    }

    fn editable_clip_mut(&mut self, clip_id: Uuid) -> Result<&mut Clip> {
        let (track_idx, _) = self.locate(clip_id)?;
        let track_id = self.tracks[track_idx].id;
        self.editable_track(track_id)?;
        self.tracks[track_idx]
            .find_clip_mut(clip_id)
            .ok_or_else(|| MontageError::Internal(format!("clip {clip_id} vanished")))
    }

    // ── Evaluation ──────────────────────────────────────────────

    /// Value of a clip property at playback time `t`.
    pub fn evaluate_property(&self, clip_id: Uuid, property: &PropertyName, t: f64) -> Result<f64> {
        let (_, clip) = self.locate(clip_id)?;
        Ok(clip.evaluate(property, t))
    }

    /// Every keyed property of every enabled clip active at playback time `t`.
    pub fn sample_at(&self, t: f64) -> Vec<PropertySample> {
        let mut samples = Vec::new();
        for track in &self.tracks {
            let Some(clip) = track.clip_at_time(t).filter(|c| c.enabled) else {
                continue;
            };
            for (name, prop) in &clip.properties {
                samples.push(PropertySample {
                    track_id: track.id,
                    clip_id: clip.id,
                    property: name.clone(),
                    value: prop.evaluate(clip.local_time(t)),
                });
            }
        }
        samples
    }

    // ── Validation ──────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn validate_placement(
        &self,
        track_id: Uuid,
        clip_id: Option<Uuid>,
        asset_id: AssetId,
        start: f64,
        duration: f64,
        source_in: f64,
        assets: &dyn AssetLookup,
    ) -> Result<()> {
        if !(start.is_finite() && duration.is_finite() && source_in.is_finite()) {
            return Err(MontageError::InvalidParameter(format!(
                "clip timing must be finite (start {start}, duration {duration}, in {source_in})"
            )));
        }
        if start < 0.0 {
            return Err(MontageError::TimelineConflict(format!(
                "clip start {start}s is before the timeline origin"
            )));
        }
        if duration <= 0.0 {
            return Err(MontageError::TimelineConflict(format!(
                "clip duration must be positive, got {duration}s"
            )));
        }
        if source_in < 0.0 {
            return Err(MontageError::TimelineConflict(format!(
                "source in point {source_in}s is negative"
            )));
        }

        let track = self.editable_track(track_id)?;

        let asset = ready_asset(assets, asset_id)?;
        let available = asset.duration().unwrap_or(0.0);
        if source_in + duration > available + SOURCE_EPSILON {
            return Err(MontageError::TimelineConflict(format!(
                "source range {source_in}s..{}s exceeds {asset_id} duration {available}s",
                source_in + duration
            )));
        }

        if let Some(other) = track.conflict_with(TimeRange::new(start, duration), clip_id) {
            return Err(MontageError::TimelineConflict(format!(
                "[{start}s, {}s) overlaps clip {} at [{}s, {}s) on track {}",
                start + duration,
                other.id,
                other.start_time,
                other.end_time(),
                track.name
            )));
        }
        Ok(())
    }

    /// Rewrite asset references, e.g. after re-registering media in a fresh catalog.
    pub fn remap_assets(&mut self, mapping: &HashMap<AssetId, AssetId>) {
        for track in &mut self.tracks {
            for clip in track.clips_mut() {
                if let Some(new_id) = mapping.get(&clip.asset_id) {
                    clip.asset_id = *new_id;
                }
            }
        }
    }
}

/// Fetch an asset that is probed (strict policy: no optimistic placement).
fn ready_asset(assets: &dyn AssetLookup, asset_id: AssetId) -> Result<MediaAsset> {
    let asset = assets
        .asset(asset_id)
        .ok_or_else(|| MontageError::NotFound(format!("asset {asset_id}")))?;
    if !asset.status.is_probed() {
        return Err(MontageError::AssetNotReady {
            asset_id,
            status: asset.status,
        });
    }
    Ok(asset)
}

impl Default for Project {
    fn default() -> Self {
        Self::new("Untitled Project")
    }
}
