//! Montage Core - Foundation types for the timeline and media pipeline
//!
//! This crate provides the types every other Montage crate shares:
//! - Keyframe curves and the curve evaluator
//! - Time representation (RationalTime, FrameRate, TimeRange)
//! - Media asset identity, state and the `AssetLookup` seam
//! - The error taxonomy

pub mod asset;
pub mod error;
pub mod keyframe;
pub mod time;

pub use asset::{AssetId, AssetLookup, AssetStatus, IdGenerator, MediaAsset, MediaMetadata};
pub use error::{MontageError, Result};
pub use keyframe::{evaluate, AnimatedProperty, CubicBezier, Interpolation, Keyframe};
pub use time::{FrameRate, RationalTime, TimeRange};
