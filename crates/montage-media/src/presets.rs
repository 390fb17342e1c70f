//! Export settings, encoder tables and the proxy preset.

use montage_core::{AssetId, FrameRate, MontageError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::{EngineInvocation, EngineProgram};

// ── Format presets ──────────────────────────────────────────────

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Mp4,
    Mov,
    Avi,
}

impl ContainerFormat {
    /// File extension for this container.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Avi => "avi",
        }
    }
}

/// Video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    H265,
    Prores,
}

impl VideoCodec {
    /// FFmpeg encoder name.
    pub fn ffmpeg_encoder(self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::H265 => "libx265",
            Self::Prores => "prores_ks",
        }
    }

    /// Audio encoder paired with this video codec.
    pub fn audio_encoder(self) -> &'static str {
        match self {
            Self::H264 | Self::H265 => "aac",
            Self::Prores => "pcm_s16le",
        }
    }

    fn pixel_format(self) -> &'static str {
        match self {
            Self::H264 | Self::H265 => "yuv420p",
            Self::Prores => "yuv422p10le",
        }
    }
}

/// Output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    Hd1080,
    #[serde(rename = "4k")]
    Uhd4k,
}

impl Resolution {
    /// Width and height in pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Hd720 => (1280, 720),
            Self::Hd1080 => (1920, 1080),
            Self::Uhd4k => (3840, 2160),
        }
    }
}

/// x264/x265 speed preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodePreset {
    Fast,
    Medium,
    Slow,
}

impl EncodePreset {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
        }
    }
}

fn default_frame_rate() -> FrameRate {
    FrameRate::FPS_30
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("exports")
}

/// Everything the host chooses about an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    pub format: ContainerFormat,
    pub codec: VideoCodec,
    pub resolution: Resolution,
    /// Target video bitrate, e.g. `"8M"` or `"2500k"`.
    pub bitrate: String,
    pub preset: EncodePreset,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: FrameRate,
    /// Render from proxies instead of source media.
    #[serde(default)]
    pub use_proxies: bool,
    /// Sample the visual compositing properties into the plan.
    #[serde(default)]
    pub composite: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: ContainerFormat::Mp4,
            codec: VideoCodec::H264,
            resolution: Resolution::Hd1080,
            bitrate: "8M".into(),
            preset: EncodePreset::Medium,
            frame_rate: default_frame_rate(),
            use_proxies: false,
            composite: false,
            output_dir: default_output_dir(),
        }
    }
}

impl ExportSettings {
    /// Reject combinations the encoder table cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_bitrate(&self.bitrate) {
            return Err(MontageError::InvalidParameter(format!(
                "bitrate {:?} must be digits with an optional k/M suffix",
                self.bitrate
            )));
        }
        if self.codec == VideoCodec::Prores && self.format != ContainerFormat::Mov {
            return Err(MontageError::InvalidParameter(format!(
                "prores requires a mov container, not {}",
                self.format.extension()
            )));
        }
        if self.frame_rate.numerator == 0 || self.frame_rate.denominator == 0 {
            return Err(MontageError::InvalidParameter(format!(
                "frame rate {}/{} must be positive",
                self.frame_rate.numerator, self.frame_rate.denominator
            )));
        }
        Ok(())
    }

    /// Encoder flags for this configuration (everything after the filter graph).
    pub fn encoder_args(&self) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.codec.ffmpeg_encoder().to_string()];
        match self.codec {
            VideoCodec::Prores => {
                args.extend(["-profile:v".to_string(), "3".to_string()]);
            }
            VideoCodec::H264 | VideoCodec::H265 => {
                args.extend([
                    "-preset".to_string(),
                    self.preset.as_str().to_string(),
                    "-b:v".to_string(),
                    self.bitrate.clone(),
                ]);
            }
        }
        let (width, height) = self.resolution.dimensions();
        args.extend([
            "-s".to_string(),
            format!("{width}x{height}"),
            "-r".to_string(),
            format!("{}/{}", self.frame_rate.numerator, self.frame_rate.denominator),
            "-pix_fmt".to_string(),
            self.codec.pixel_format().to_string(),
        ]);
        args
    }

    /// Audio encoder flags.
    pub fn audio_args(&self) -> Vec<String> {
        let mut args = vec!["-c:a".to_string(), self.codec.audio_encoder().to_string()];
        if self.codec != VideoCodec::Prores {
            args.extend(["-b:a".to_string(), "192k".to_string()]);
        }
        args
    }
}

/// `^\d+[kKmM]?$`
fn is_valid_bitrate(bitrate: &str) -> bool {
    let digits = bitrate
        .strip_suffix(['k', 'K', 'm', 'M'])
        .unwrap_or(bitrate);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

// ── Proxy preset ────────────────────────────────────────────────

/// Low-resolution editing proxy: H.264 veryfast, CRF 23, AAC 128k.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyPreset {
    /// Target width; height follows the aspect ratio.
    pub width: u32,
    pub crf: u32,
}

impl Default for ProxyPreset {
    fn default() -> Self {
        Self {
            width: 1280,
            crf: 23,
        }
    }
}

impl ProxyPreset {
    pub fn with_width(width: u32) -> Self {
        Self {
            width,
            ..Self::default()
        }
    }

    /// Where the proxy for `asset` is written.
    pub fn proxy_path(proxy_dir: &Path, asset: AssetId) -> PathBuf {
        proxy_dir.join(format!("{asset}_proxy.mp4"))
    }

    /// Build the `ffmpeg` call that renders `source` into `output`.
    pub fn invocation(&self, source: &Path, output: &Path) -> EngineInvocation {
        EngineInvocation::new(
            EngineProgram::Ffmpeg,
            vec![
                "-y".into(),
                "-i".into(),
                source.to_string_lossy().into_owned(),
                "-c:v".into(),
                "libx264".into(),
                "-preset".into(),
                "veryfast".into(),
                "-crf".into(),
                self.crf.to_string(),
                "-vf".into(),
                format!("scale={}:-2", self.width),
                "-c:a".into(),
                "aac".into(),
                "-b:a".into(),
                "128k".into(),
                output.to_string_lossy().into_owned(),
            ],
        )
        .with_output(output)
    }
}
