//! Service configuration.

use montage_media::ProxyPreset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};
use crate::job::JobKind;
use crate::retry::RetryPolicy;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "MONTAGE_CONFIG";

/// Top-level configuration for the engine and its hosts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MontageConfig {
    pub pipeline: PipelineConfig,
    pub engine: EngineConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

/// Scheduler limits, deadlines and retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Jobs running at once across all kinds.
    pub max_concurrency: usize,
    /// Per-kind caps; `None` means the global cap.
    pub probe_concurrency: Option<usize>,
    pub proxy_concurrency: Option<usize>,
    pub export_concurrency: Option<usize>,
    pub probe_timeout_secs: u64,
    pub proxy_timeout_secs: u64,
    pub export_timeout_secs: u64,
    pub retry: RetryPolicy,
    /// Buffered job events per subscriber.
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: num_cpus::get().max(1),
            probe_concurrency: None,
            proxy_concurrency: None,
            export_concurrency: Some(1),
            probe_timeout_secs: 60,
            proxy_timeout_secs: 30 * 60,
            export_timeout_secs: 4 * 60 * 60,
            retry: RetryPolicy::default(),
            event_capacity: 256,
        }
    }
}

impl PipelineConfig {
    /// Running-job cap for one kind, never above the global cap.
    pub fn cap(&self, kind: JobKind) -> usize {
        let global = self.max_concurrency.max(1);
        let per_kind = match kind {
            JobKind::Probe => self.probe_concurrency,
            JobKind::ProxyGenerate => self.proxy_concurrency,
            JobKind::ExportRender => self.export_concurrency,
        };
        per_kind.unwrap_or(global).clamp(1, global)
    }

    /// Deadline for a single engine invocation of `kind`.
    pub fn timeout(&self, kind: JobKind) -> Duration {
        Duration::from_secs(match kind {
            JobKind::Probe => self.probe_timeout_secs,
            JobKind::ProxyGenerate => self.proxy_timeout_secs,
            JobKind::ExportRender => self.export_timeout_secs,
        })
    }
}

/// External engine binaries and proxy output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit `ffmpeg` binary; looked up on `PATH` when unset.
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub proxy_width: u32,
    pub proxy_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            proxy_width: ProxyPreset::default().width,
            proxy_dir: default_cache_dir().join("proxies"),
        }
    }
}

impl EngineConfig {
    pub fn proxy_preset(&self) -> ProxyPreset {
        ProxyPreset::with_width(self.proxy_width)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Where renders land unless the request names a directory.
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("exports"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "montage_pipeline=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl MontageConfig {
    /// Load config from `$MONTAGE_CONFIG` or the standard location,
    /// falling back to defaults.
    pub fn load() -> Self {
        let Some(config_path) = config_file_path() else {
            return Self::default();
        };
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &Path) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| PipelineError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|base| base.join("montage").join("config.json"))
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|base| base.join("montage"))
        .unwrap_or_else(|| PathBuf::from(".montage"))
}
