//! Media asset identity and state shared by the timeline, the planner and the catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::time::FrameRate;

/// Catalog-scoped asset identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(u64);

impl AssetId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset-{:06}", self.0)
    }
}

/// Monotonic id source. Each catalog or scheduler owns its own instance, so
/// independent services never share a counter.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Next raw id; never returns the same value twice.
    pub fn next_raw(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of an imported asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Pending,
    Probed,
    ProxyReady,
    Failed,
}

impl AssetStatus {
    /// Metadata is known (duration, fps...), so clips may reference the asset.
    pub fn is_probed(self) -> bool {
        matches!(self, Self::Probed | Self::ProxyReady)
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Probed => "probed",
            Self::ProxyReady => "proxy-ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Stream metadata reported by the probe job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Duration in seconds.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Primary video codec name, `"unknown"` when the container has none.
    pub codec: String,
    pub audio_codec: Option<String>,
}

impl MediaMetadata {
    pub fn fps(&self) -> f64 {
        self.frame_rate.to_fps_f64()
    }

    pub fn has_video(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// An imported source file and what the pipeline has learned about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: AssetId,
    /// Absolute, normalized source path.
    pub source_path: PathBuf,
    pub status: AssetStatus,
    pub metadata: Option<MediaMetadata>,
    pub proxy_path: Option<PathBuf>,
    /// Reason of the last failure, if any.
    pub failure: Option<String>,
    /// Import attempt, bumped each time a failed asset is registered again.
    pub attempt: u32,
}

impl MediaAsset {
    pub fn new(id: AssetId, source_path: PathBuf) -> Self {
        Self {
            id,
            source_path,
            status: AssetStatus::Pending,
            metadata: None,
            proxy_path: None,
            failure: None,
            attempt: 1,
        }
    }

    /// Duration from probe metadata.
    pub fn duration(&self) -> Option<f64> {
        self.metadata.as_ref().map(|m| m.duration)
    }
}

/// Read-only access to asset state.
///
/// The timeline validates clip bounds through it and the export planner
/// checks readiness through it; the media catalog is the production
/// implementation.
pub trait AssetLookup {
    fn asset(&self, id: AssetId) -> Option<MediaAsset>;
}

impl<T: AssetLookup + ?Sized> AssetLookup for &T {
    fn asset(&self, id: AssetId) -> Option<MediaAsset> {
        (**self).asset(id)
    }
}

impl AssetLookup for std::collections::HashMap<AssetId, MediaAsset> {
    fn asset(&self, id: AssetId) -> Option<MediaAsset> {
        self.get(&id).cloned()
    }
}
