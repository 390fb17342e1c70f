pub mod export;
pub mod import;
pub mod plan;
pub mod probe;

use std::path::PathBuf;

use clap::Args;
use montage_core::FrameRate;
use montage_media::{ContainerFormat, EncodePreset, ExportSettings, Resolution, VideoCodec};
use montage_pipeline::MontageConfig;
use montage_timeline::Project;
use serde::de::DeserializeOwned;

/// Options shared by `plan` and `export`.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Project file
    pub project: PathBuf,

    /// Container: mp4|mov|avi
    #[arg(long, default_value = "mp4", value_parser = parse_choice::<ContainerFormat>)]
    pub format: ContainerFormat,

    /// Video codec: h264|h265|prores
    #[arg(long, default_value = "h264", value_parser = parse_choice::<VideoCodec>)]
    pub codec: VideoCodec,

    /// Output resolution: 720p|1080p|4k
    #[arg(long, default_value = "1080p", value_parser = parse_choice::<Resolution>)]
    pub resolution: Resolution,

    /// Video bitrate, e.g. 8M or 2500k
    #[arg(long, default_value = "8M")]
    pub bitrate: String,

    /// Encoder preset: fast|medium|slow
    #[arg(long, default_value = "medium", value_parser = parse_choice::<EncodePreset>)]
    pub preset: EncodePreset,

    /// Output frame rate ("30", "29.97", "30000/1001"); defaults to the project's
    #[arg(long)]
    pub fps: Option<String>,

    /// Render from proxies
    #[arg(long)]
    pub proxies: bool,

    /// Sample compositing properties into the plan
    #[arg(long)]
    pub composite: bool,

    /// Output directory (defaults to the configured export dir)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

impl ExportArgs {
    pub fn settings(&self, config: &MontageConfig, project: &Project) -> anyhow::Result<ExportSettings> {
        let frame_rate = match &self.fps {
            Some(rate) => FrameRate::parse(rate)?,
            None => project.frame_rate,
        };
        let settings = ExportSettings {
            format: self.format,
            codec: self.codec,
            resolution: self.resolution,
            bitrate: self.bitrate.clone(),
            preset: self.preset,
            frame_rate,
            use_proxies: self.proxies,
            composite: self.composite,
            output_dir: self
                .output_dir
                .clone()
                .unwrap_or_else(|| config.export.output_dir.clone()),
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Parse a CLI value through the type's serde names.
fn parse_choice<T: DeserializeOwned>(value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.to_ascii_lowercase()))
        .map_err(|_| format!("unsupported value {value:?}"))
}
