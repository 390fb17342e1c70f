//! Probe a single media file.

use std::path::PathBuf;

use montage_media::{probe, CancelToken, FfmpegEngine};
use montage_pipeline::MontageConfig;

pub async fn run(config: &MontageConfig, path: PathBuf) -> anyhow::Result<()> {
    let engine = FfmpegEngine::new(
        config.engine.ffmpeg_path.as_deref(),
        config.engine.ffprobe_path.as_deref(),
    )?;
    let metadata = probe(&engine, &path, &CancelToken::new()).await?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}
