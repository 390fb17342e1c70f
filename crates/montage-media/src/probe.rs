//! Media file probing to get metadata without full decode.

use montage_core::{FrameRate, MediaMetadata};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::engine::{EngineInvocation, EngineProgram, MediaEngine};
use crate::error::{EngineError, EngineResult};

/// Build the `ffprobe` call for a source file.
pub fn probe_invocation(path: &Path) -> EngineInvocation {
    EngineInvocation::new(
        EngineProgram::Ffprobe,
        vec![
            "-v".into(),
            "error".into(),
            "-print_format".into(),
            "json".into(),
            "-show_format".into(),
            "-show_streams".into(),
            path.to_string_lossy().into_owned(),
        ],
    )
}

#[derive(Debug, Deserialize)]
struct ProbeDocument {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -print_format json` output.
///
/// Missing fields fall back the way ffprobe consumers usually do: 30 fps,
/// codec `"unknown"`, zero dimensions for audio-only media.
pub fn parse_probe_output(stdout: &[u8]) -> EngineResult<MediaMetadata> {
    let doc: ProbeDocument = serde_json::from_slice(stdout)
        .map_err(|e| EngineError::Malformed(format!("ffprobe JSON: {e}")))?;

    let video = doc
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = doc
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    if video.is_none() && audio.is_none() {
        return Err(EngineError::Malformed(
            "no audio or video streams found".into(),
        ));
    }

    let duration = doc
        .format
        .as_ref()
        .and_then(|f| parse_seconds(f.duration.as_deref()))
        .or_else(|| video.and_then(|s| parse_seconds(s.duration.as_deref())))
        .or_else(|| audio.and_then(|s| parse_seconds(s.duration.as_deref())))
        .unwrap_or(0.0);

    let frame_rate = video
        .and_then(|s| s.r_frame_rate.as_deref())
        .and_then(|r| FrameRate::parse(r).ok())
        .unwrap_or(FrameRate::FPS_30);

    Ok(MediaMetadata {
        duration,
        width: video.and_then(|s| s.width).unwrap_or(0),
        height: video.and_then(|s| s.height).unwrap_or(0),
        frame_rate,
        codec: video
            .and_then(|s| s.codec_name.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        audio_codec: audio.and_then(|s| s.codec_name.clone()),
    })
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Probe a media file through the given engine.
pub async fn probe(
    engine: &dyn MediaEngine,
    path: &Path,
    cancel: &CancelToken,
) -> EngineResult<MediaMetadata> {
    let output = engine.run(&probe_invocation(path), cancel).await?;
    let metadata = parse_probe_output(&output.stdout)?;
    debug!(
        path = %path.display(),
        duration = metadata.duration,
        codec = %metadata.codec,
        "probed media"
    );
    Ok(metadata)
}
