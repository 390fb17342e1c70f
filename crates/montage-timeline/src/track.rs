//! Track types for the timeline.

use montage_core::TimeRange;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clip::Clip;

/// Kind of track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    Audio,
}

/// A track of clips kept sorted by start time with disjoint intervals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique track ID
    pub id: Uuid,
    /// Track name
    pub name: String,
    /// Track kind
    pub kind: TrackKind,
    clips: Vec<Clip>,
    /// Is track muted (audio tracks are dropped from export while muted)
    #[serde(default)]
    pub muted: bool,
    /// Is track locked (prevent edits)
    #[serde(default)]
    pub locked: bool,
}

impl Track {
    pub fn new(kind: TrackKind, name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), kind, name)
    }

    pub(crate) fn with_id(id: Uuid, kind: TrackKind, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            clips: Vec::new(),
            muted: false,
            locked: false,
        }
    }

    /// Create a new video track.
    pub fn new_video(name: impl Into<String>) -> Self {
        Self::new(TrackKind::Video, name)
    }

    /// Create a new audio track.
    pub fn new_audio(name: impl Into<String>) -> Self {
        Self::new(TrackKind::Audio, name)
    }

    /// Clips in start-time order.
    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    /// End of the last clip, or 0 for an empty track.
    pub fn duration(&self) -> f64 {
        self.clips.last().map_or(0.0, Clip::end_time)
    }

    /// First clip whose interval intersects `range`, ignoring `except`.
    pub fn conflict_with(&self, range: TimeRange, except: Option<Uuid>) -> Option<&Clip> {
        self.clips
            .iter()
            .filter(|clip| Some(clip.id) != except)
            .find(|clip| clip.range().overlaps(range))
    }

    /// Insert keeping start-time order. Callers check for overlaps first.
    pub(crate) fn insert_sorted(&mut self, clip: Clip) {
        let pos = self
            .clips
            .partition_point(|c| c.start_time <= clip.start_time);
        self.clips.insert(pos, clip);
    }

    pub(crate) fn take_clip(&mut self, id: Uuid) -> Option<Clip> {
        let pos = self.clips.iter().position(|c| c.id == id)?;
        Some(self.clips.remove(pos))
    }

    /// Find a clip by UUID. Returns (index, &Clip).
    pub fn find_clip(&self, id: Uuid) -> Option<(usize, &Clip)> {
        self.clips.iter().enumerate().find(|(_, c)| c.id == id)
    }

    /// Mutable access for edits that cannot change ordering (asset remaps).
    pub(crate) fn clips_mut(&mut self) -> impl Iterator<Item = &mut Clip> {
        self.clips.iter_mut()
    }

    pub(crate) fn find_clip_mut(&mut self, id: Uuid) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|c| c.id == id)
    }

    /// Clip playing at `time`, if any.
    pub fn clip_at_time(&self, time: f64) -> Option<&Clip> {
        let idx = self.clips.partition_point(|c| c.start_time <= time);
        let candidate = self.clips.get(idx.checked_sub(1)?)?;
        candidate.range().contains(time).then_some(candidate)
    }

    /// Number of clips in this track.
    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    /// Check ordering and disjointness, returning the first offending pair.
    pub fn first_overlap(&self) -> Option<(&Clip, &Clip)> {
        self.clips
            .windows(2)
            .find(|w| w[0].start_time > w[1].start_time || w[0].range().overlaps(w[1].range()))
            .map(|w| (&w[0], &w[1]))
    }
}
