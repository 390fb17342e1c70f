//! Montage Media - the external media engine seam
//!
//! This crate handles:
//! - Running `ffmpeg` / `ffprobe` as cancellable subprocesses
//! - Media file probing
//! - Proxy and export encoder presets
//! - Export planning from timeline snapshots

pub mod cancel;
pub mod engine;
pub mod error;
pub mod export;
pub mod presets;
pub mod probe;

pub use cancel::CancelToken;
pub use engine::{EngineInvocation, EngineOutput, EngineProgram, FfmpegEngine, MediaEngine};
pub use error::{EngineError, EngineResult};
pub use export::{plan, ExportPlan, ExportSegment};
pub use presets::{
    ContainerFormat, EncodePreset, ExportSettings, ProxyPreset, Resolution, VideoCodec,
};
pub use probe::{parse_probe_output, probe, probe_invocation};
