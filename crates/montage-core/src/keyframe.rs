//! Keyframe animation: the curve evaluator and the animated property that owns it.
//!
//! Evaluation is a pure function of a sorted keyframe slice and a query time,
//! so it can be called from any number of threads for preview sampling while
//! the export planner samples the same curves.

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use std::fmt;

use crate::error::{MontageError, Result};
use crate::time::{FrameRate, RationalTime};

// ── Easing curves ───────────────────────────────────────────────

/// Cubic Bézier control points (x1, y1, x2, y2) for a curve from (0,0) to (1,1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CubicBezier {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl CubicBezier {
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// X coordinate of the curve at parameter t.
    pub fn sample_x(&self, t: f64) -> f64 {
        bernstein(t, self.x1, self.x2)
    }

    /// Y coordinate of the curve at parameter t.
    pub fn sample_y(&self, t: f64) -> f64 {
        bernstein(t, self.y1, self.y2)
    }

    /// Eased progress for time progress `p`.
    ///
    /// `p` is fed straight in as the curve parameter and the y coordinate is
    /// returned; there is no solve for the parameter whose x equals `p`. The
    /// x handles therefore have no effect on timing. Project files authored
    /// against this behaviour depend on it, so it is kept as-is.
    pub fn ease(&self, p: f64) -> f64 {
        self.sample_y(p.clamp(0.0, 1.0))
    }

    pub const LINEAR: Self = Self::new(0.0, 0.0, 1.0, 1.0);
    pub const EASE_IN_OUT: Self = Self::new(0.42, 0.0, 0.58, 1.0);
}

impl Default for CubicBezier {
    fn default() -> Self {
        Self::new(0.25, 0.25, 0.75, 0.75)
    }
}

/// Cubic Bernstein blend with fixed end points 0 and 1.
#[inline]
fn bernstein(t: f64, c1: f64, c2: f64) -> f64 {
    let u = 1.0 - t;
    3.0 * u * u * t * c1 + 3.0 * u * t * t * c2 + t * t * t
}

/// How to interpolate from a keyframe to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interpolation {
    /// Step: keep the value until the next keyframe.
    Hold,
    #[default]
    Linear,
    Bezier {
        #[serde(default)]
        handles: CubicBezier,
    },
    /// Quarter-cosine ease: starts slow.
    EaseIn,
    /// Quarter-sine ease: ends slow.
    EaseOut,
}

impl Interpolation {
    pub fn bezier(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::Bezier {
            handles: CubicBezier::new(x1, y1, x2, y2),
        }
    }

    /// Map time progress `p ∈ [0,1]` to value progress.
    #[inline]
    fn progress(self, p: f64) -> f64 {
        match self {
            Self::Hold => 0.0,
            Self::Linear => p,
            Self::Bezier { handles } => handles.ease(p),
            Self::EaseIn => 1.0 - (p * FRAC_PI_2).cos(),
            Self::EaseOut => (p * FRAC_PI_2).sin(),
        }
    }
}

// ── Keyframe ────────────────────────────────────────────────────

/// A single control point of an animated property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Clip-local time in seconds.
    pub time: f64,
    pub value: f64,
    /// Interpolation used towards the next keyframe.
    #[serde(default)]
    pub interpolation: Interpolation,
}

impl Keyframe {
    pub fn new(time: f64, value: f64) -> Self {
        Self::with_interpolation(time, value, Interpolation::Linear)
    }

    pub fn with_interpolation(time: f64, value: f64, interpolation: Interpolation) -> Self {
        Self {
            time,
            value,
            interpolation,
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.time.is_finite() || self.time < 0.0 {
            return Err(MontageError::InvalidParameter(format!(
                "keyframe time must be finite and >= 0, got {}",
                self.time
            )));
        }
        if !self.value.is_finite() {
            return Err(MontageError::InvalidParameter(format!(
                "keyframe value must be finite, got {}",
                self.value
            )));
        }
        Ok(())
    }
}

// ── Evaluation ──────────────────────────────────────────────────

/// Evaluate a time-sorted keyframe sequence at `t`.
///
/// Empty input yields `default`, values are clamped to the first/last
/// keyframe outside the keyed span, and the earlier keyframe of the
/// bracketing pair picks the interpolation. A NaN `t` reads as the first
/// keyframe.
pub fn evaluate(keyframes: &[Keyframe], t: f64, default: f64) -> f64 {
    let (first, last) = match (keyframes.first(), keyframes.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return default,
    };
    if keyframes.len() == 1 || t.is_nan() || t <= first.time {
        return first.value;
    }
    if t >= last.time {
        return last.value;
    }

    // first.time < t < last.time, so 1 <= idx < len
    let idx = keyframes.partition_point(|kf| kf.time <= t);
    let before = &keyframes[idx - 1];
    let after = &keyframes[idx];
    interpolate(before, after, t)
}

fn interpolate(before: &Keyframe, after: &Keyframe, t: f64) -> f64 {
    let span = after.time - before.time;
    if span <= 0.0 {
        return before.value;
    }
    let p = ((t - before.time) / span).clamp(0.0, 1.0);
    before.value + (after.value - before.value) * before.interpolation.progress(p)
}

// ── Animated property ───────────────────────────────────────────

/// Sorted keyframes for one animated parameter of a clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AnimatedPropertyRepr")]
pub struct AnimatedProperty {
    /// Value reported while no keyframe exists.
    default: f64,
    keyframes: Vec<Keyframe>,
}

#[derive(Deserialize)]
struct AnimatedPropertyRepr {
    #[serde(default)]
    default: f64,
    #[serde(default)]
    keyframes: Vec<Keyframe>,
}

impl TryFrom<AnimatedPropertyRepr> for AnimatedProperty {
    type Error = MontageError;

    fn try_from(repr: AnimatedPropertyRepr) -> Result<Self> {
        Self::from_keyframes(repr.default, repr.keyframes)
    }
}

impl AnimatedProperty {
    pub fn new(default: f64) -> Self {
        Self {
            default,
            keyframes: Vec::new(),
        }
    }

    /// Build from keyframes that must already be strictly increasing in time.
    pub fn from_keyframes(default: f64, keyframes: Vec<Keyframe>) -> Result<Self> {
        for kf in &keyframes {
            kf.validate()?;
        }
        if let Some(pair) = keyframes.windows(2).find(|w| w[0].time >= w[1].time) {
            return Err(MontageError::InvalidParameter(format!(
                "keyframe times must be strictly increasing ({} then {})",
                pair[0].time, pair[1].time
            )));
        }
        Ok(Self { default, keyframes })
    }

    /// Insert a keyframe, replacing any keyframe at the same time.
    pub fn set(&mut self, keyframe: Keyframe) -> Result<()> {
        keyframe.validate()?;
        match self
            .keyframes
            .binary_search_by(|kf| kf.time.total_cmp(&keyframe.time))
        {
            Ok(pos) => self.keyframes[pos] = keyframe,
            Err(pos) => self.keyframes.insert(pos, keyframe),
        }
        Ok(())
    }

    /// Remove the keyframe at exactly `time`.
    pub fn remove(&mut self, time: f64) -> Option<Keyframe> {
        let pos = self.position(time)?;
        Some(self.keyframes.remove(pos))
    }

    /// Move the keyframe at `from` to `to`, replacing whatever sits at `to`.
    pub fn move_keyframe(&mut self, from: f64, to: f64) -> Result<()> {
        let pos = self
            .position(from)
            .ok_or_else(|| MontageError::NotFound(format!("no keyframe at {from}s")))?;
        let mut moved = self.keyframes[pos];
        moved.time = to;
        moved.validate()?;
        self.keyframes.remove(pos);
        self.set(moved)
    }

    fn position(&self, time: f64) -> Option<usize> {
        self.keyframes
            .binary_search_by(|kf| kf.time.total_cmp(&time))
            .ok()
    }

    /// Evaluate at clip-local time `t`.
    pub fn evaluate(&self, t: f64) -> f64 {
        evaluate(&self.keyframes, t, self.default)
    }

    /// Sample `frames` consecutive frames starting at clip-local `start`.
    pub fn sample_frames(&self, start: f64, rate: FrameRate, frames: usize) -> Vec<f64> {
        sample_frames(&self.keyframes, start, rate, frames, self.default)
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn default_value(&self) -> f64 {
        self.default
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// Whether the value changes over time (more than one keyframe).
    pub fn is_animated(&self) -> bool {
        self.keyframes.len() > 1
    }
}

impl fmt::Display for AnimatedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnimatedProperty({} keyframes)", self.keyframes.len())
    }
}

/// Per-frame values on a rational frame grid, so long exports do not drift.
pub fn sample_frames(
    keyframes: &[Keyframe],
    start: f64,
    rate: FrameRate,
    frames: usize,
    default: f64,
) -> Vec<f64> {
    (0..frames)
        .map(|i| {
            let offset = RationalTime::from_frames(i as i64, rate).to_seconds_f64();
            evaluate(keyframes, start + offset, default)
        })
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────
