//! Project serialization with schema versioning.
//!
//! Uses JSON with a schema version field. Loading re-checks every timeline
//! invariant so a hand-edited or corrupted document is refused up front.

use montage_core::{AssetId, MontageError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::project::Project;

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// A media reference stored alongside the project.
///
/// Asset ids are scoped to the catalog that issued them, so the document
/// keeps the source path and hosts re-register it on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub asset_id: AssetId,
    pub path: PathBuf,
}

/// Versioned project file wrapper.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectFile {
    /// Schema version.
    pub version: u32,
    /// The project data.
    pub project: Project,
    /// Media referenced by the project's clips.
    #[serde(default)]
    pub media: Vec<MediaEntry>,
    /// Application version that wrote this file.
    pub app_version: String,
}

impl ProjectFile {
    /// Create a new project file from a project.
    pub fn new(project: Project) -> Self {
        Self {
            version: CURRENT_VERSION,
            project,
            media: Vec::new(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Attach the media table.
    pub fn with_media(mut self, media: impl IntoIterator<Item = (AssetId, PathBuf)>) -> Self {
        let table: BTreeMap<AssetId, PathBuf> = media.into_iter().collect();
        self.media = table
            .into_iter()
            .map(|(asset_id, path)| MediaEntry { asset_id, path })
            .collect();
        self
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| MontageError::Serialization(format!("Failed to serialize project: {}", e)))
    }

    /// Deserialize from JSON bytes and validate.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        // Read the version first so newer files get a precise error
        let raw: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| MontageError::Serialization(format!("Invalid JSON: {}", e)))?;

        let version = raw
            .get("version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| MontageError::Serialization("Missing schema version".into()))?;

        if version != u64::from(CURRENT_VERSION) {
            return Err(MontageError::Serialization(format!(
                "Project file version {} is not supported (expected {})",
                version, CURRENT_VERSION
            )));
        }

        let file: Self = serde_json::from_value(raw)
            .map_err(|e| MontageError::Serialization(format!("Failed to parse project: {}", e)))?;
        file.validate()?;
        Ok(file)
    }

    /// Check the structural invariants the edit operations maintain.
    pub fn validate(&self) -> Result<()> {
        let mut clip_ids = HashSet::new();
        for track in self.project.tracks() {
            for clip in track.clips() {
                if !clip_ids.insert(clip.id) {
                    return Err(MontageError::Serialization(format!(
                        "clip {} appears more than once",
                        clip.id
                    )));
                }
                if clip.track_id != track.id {
                    return Err(MontageError::Serialization(format!(
                        "clip {} claims track {} but is stored on {}",
                        clip.id, clip.track_id, track.id
                    )));
                }
                let finite = clip.start_time.is_finite()
                    && clip.duration.is_finite()
                    && clip.source_in_offset.is_finite();
                if !finite
                    || clip.start_time < 0.0
                    || clip.duration <= 0.0
                    || clip.source_in_offset < 0.0
                {
                    return Err(MontageError::TimelineConflict(format!(
                        "clip {} has invalid timing (start {}, duration {}, in {})",
                        clip.id, clip.start_time, clip.duration, clip.source_in_offset
                    )));
                }
            }
            if let Some((a, b)) = track.first_overlap() {
                return Err(MontageError::TimelineConflict(format!(
                    "clips {} and {} on track {} are unordered or overlap",
                    a.id, b.id, track.name
                )));
            }
        }

        let known: HashSet<AssetId> = self.media.iter().map(|m| m.asset_id).collect();
        if let Some(missing) = self
            .project
            .referenced_assets()
            .into_iter()
            .find(|id| !known.contains(id))
        {
            return Err(MontageError::Serialization(format!(
                "{} is referenced by a clip but missing from the media table",
                missing
            )));
        }
        Ok(())
    }

    /// Save project to a file path.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let data = self.to_json()?;
        std::fs::write(path, data)?;
        info!(path = %path.display(), project = %self.project.name, "saved project");
        Ok(())
    }

    /// Load project from a file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let file = Self::from_json(&data)?;
        debug!(path = %path.display(), tracks = file.project.tracks().len(), "loaded project");
        Ok(file)
    }
}
