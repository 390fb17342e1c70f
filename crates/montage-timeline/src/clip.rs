//! Clip types for the timeline.

use montage_core::{AnimatedProperty, AssetId, Keyframe, TimeRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Name of an animatable clip parameter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PropertyName {
    Opacity,
    PositionX,
    PositionY,
    Scale,
    Rotation,
    Volume,
    Custom(String),
}

impl PropertyName {
    /// Properties the compositor consumes.
    pub const VISUAL: [PropertyName; 5] = [
        Self::Opacity,
        Self::PositionX,
        Self::PositionY,
        Self::Scale,
        Self::Rotation,
    ];

    /// Neutral value of the property when it carries no keyframes.
    pub fn default_value(&self) -> f64 {
        match self {
            Self::Opacity | Self::Scale | Self::Volume => 1.0,
            Self::PositionX | Self::PositionY | Self::Rotation | Self::Custom(_) => 0.0,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Opacity => "opacity",
            Self::PositionX => "position_x",
            Self::PositionY => "position_y",
            Self::Scale => "scale",
            Self::Rotation => "rotation",
            Self::Volume => "volume",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for PropertyName {
    fn from(name: String) -> Self {
        match name.as_str() {
            "opacity" => Self::Opacity,
            "position_x" => Self::PositionX,
            "position_y" => Self::PositionY,
            "scale" => Self::Scale,
            "rotation" => Self::Rotation,
            "volume" => Self::Volume,
            _ => Self::Custom(name),
        }
    }
}

impl From<&str> for PropertyName {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<PropertyName> for String {
    fn from(name: PropertyName) -> Self {
        match name {
            PropertyName::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Placement request for a new clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipSpec {
    pub asset_id: AssetId,
    /// Timeline position in seconds.
    pub start_time: f64,
    pub duration: f64,
    /// Offset into the source media where playback begins.
    #[serde(default)]
    pub source_in_offset: f64,
    #[serde(default)]
    pub name: Option<String>,
}

impl ClipSpec {
    pub fn new(asset_id: AssetId, start_time: f64, duration: f64) -> Self {
        Self {
            asset_id,
            start_time,
            duration,
            source_in_offset: 0.0,
            name: None,
        }
    }

    pub fn with_source_in(mut self, source_in_offset: f64) -> Self {
        self.source_in_offset = source_in_offset;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A clip on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Unique clip ID
    pub id: Uuid,
    /// Clip name (displayed in the host UI)
    pub name: String,
    pub asset_id: AssetId,
    /// Owning track
    pub track_id: Uuid,
    pub start_time: f64,
    pub duration: f64,
    pub source_in_offset: f64,
    /// Is clip enabled (disabled clips are skipped by export)
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub properties: BTreeMap<PropertyName, AnimatedProperty>,
}

fn enabled_default() -> bool {
    true
}

impl Clip {
    /// Create a clip from a placement request.
    pub fn from_spec(track_id: Uuid, spec: ClipSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: spec
                .name
                .unwrap_or_else(|| format!("{} @ {:.2}s", spec.asset_id, spec.start_time)),
            asset_id: spec.asset_id,
            track_id,
            start_time: spec.start_time,
            duration: spec.duration,
            source_in_offset: spec.source_in_offset,
            enabled: true,
            properties: BTreeMap::new(),
        }
    }

    /// Timeline interval `[start, start + duration)`.
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.duration)
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Source out point.
    pub fn source_out(&self) -> f64 {
        self.source_in_offset + self.duration
    }

    /// Translate playback time into the clip-local (source) time keyframes use.
    pub fn local_time(&self, timeline_time: f64) -> f64 {
        timeline_time - self.start_time + self.source_in_offset
    }

    pub fn property(&self, name: &PropertyName) -> Option<&AnimatedProperty> {
        self.properties.get(name)
    }

    /// Value of `name` at playback time `timeline_time`.
    pub fn evaluate(&self, name: &PropertyName, timeline_time: f64) -> f64 {
        let local = self.local_time(timeline_time);
        match self.properties.get(name) {
            Some(prop) => prop.evaluate(local),
            None => name.default_value(),
        }
    }

    /// Insert or replace a keyframe. Returns the keyframe it replaced.
    pub(crate) fn set_keyframe(
        &mut self,
        name: PropertyName,
        keyframe: Keyframe,
    ) -> montage_core::Result<Option<Keyframe>> {
        let default = name.default_value();
        let prop = self
            .properties
            .entry(name)
            .or_insert_with(|| AnimatedProperty::new(default));
        let replaced = prop
            .keyframes()
            .iter()
            .find(|kf| kf.time == keyframe.time)
            .copied();
        prop.set(keyframe)?;
        Ok(replaced)
    }

    /// Remove a keyframe; drops the property entry once it has no keyframes left.
    pub(crate) fn remove_keyframe(&mut self, name: &PropertyName, time: f64) -> Option<Keyframe> {
        let prop = self.properties.get_mut(name)?;
        let removed = prop.remove(time);
        if prop.is_empty() {
            self.properties.remove(name);
        }
        removed
    }
}
