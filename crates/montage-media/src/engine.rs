//! The external media engine seam.
//!
//! Everything that decodes or encodes goes through [`MediaEngine`]; the
//! production implementation shells out to `ffmpeg` / `ffprobe`.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{stderr_tail, EngineError, EngineResult, STDERR_TAIL_LINES};

/// Which engine binary an invocation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineProgram {
    Ffmpeg,
    Ffprobe,
}

impl EngineProgram {
    pub fn binary_name(self) -> &'static str {
        match self {
            Self::Ffmpeg => "ffmpeg",
            Self::Ffprobe => "ffprobe",
        }
    }
}

impl fmt::Display for EngineProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

/// A fully described engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInvocation {
    pub program: EngineProgram,
    pub args: Vec<String>,
    /// File the invocation produces, if any. Its parent directory is created first.
    pub output: Option<PathBuf>,
}

impl EngineInvocation {
    pub fn new(program: EngineProgram, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            output: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Shell-like rendering for logs and dry runs.
    pub fn command_line(&self) -> String {
        let mut line = self.program.binary_name().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(char::is_whitespace) {
                line.push_str(&format!("'{arg}'"));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Captured result of a successful invocation.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    pub stdout: Vec<u8>,
    pub stderr_tail: String,
}

/// Runs engine invocations. Implementations must stop work promptly once
/// `cancel` fires and return [`EngineError::Cancelled`]; dropping the
/// returned future must also stop any child process.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn run(
        &self,
        invocation: &EngineInvocation,
        cancel: &CancelToken,
    ) -> EngineResult<EngineOutput>;
}

/// `ffmpeg` / `ffprobe` subprocess engine.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl FfmpegEngine {
    /// Resolve the binaries, preferring explicit paths over `PATH` lookup.
    pub fn new(ffmpeg: Option<&Path>, ffprobe: Option<&Path>) -> EngineResult<Self> {
        Ok(Self {
            ffmpeg_path: resolve(EngineProgram::Ffmpeg, ffmpeg)?,
            ffprobe_path: resolve(EngineProgram::Ffprobe, ffprobe)?,
        })
    }

    /// Resolve both binaries from `PATH`.
    pub fn from_path() -> EngineResult<Self> {
        Self::new(None, None)
    }

    pub fn binary(&self, program: EngineProgram) -> &Path {
        match program {
            EngineProgram::Ffmpeg => &self.ffmpeg_path,
            EngineProgram::Ffprobe => &self.ffprobe_path,
        }
    }
}

fn resolve(program: EngineProgram, configured: Option<&Path>) -> EngineResult<PathBuf> {
    let name = program.binary_name();
    match configured {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => which::which(path).map_err(|e| EngineError::MissingBinary {
            program: name.to_string(),
            reason: format!("{}: {e}", path.display()),
        }),
        None => which::which(name).map_err(|e| EngineError::MissingBinary {
            program: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn run(
        &self,
        invocation: &EngineInvocation,
        cancel: &CancelToken,
    ) -> EngineResult<EngineOutput> {
        let program = invocation.program;
        if let Some(parent) = invocation.output.as_deref().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        debug!(command = %invocation.command_line(), "spawning engine");
        let child = Command::new(self.binary(program))
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Losing the race drops the child, which kills it.
        let output = tokio::select! {
            _ = cancel.cancelled() => {
                warn!(program = %program, "engine invocation cancelled");
                return Err(EngineError::Cancelled);
            }
            output = child.wait_with_output() => output?,
        };

        let tail = stderr_tail(&output.stderr, STDERR_TAIL_LINES);
        if !output.status.success() {
            return Err(EngineError::Exit {
                program: program.to_string(),
                code: output.status.code(),
                stderr_tail: tail,
            });
        }

        Ok(EngineOutput {
            stdout: output.stdout,
            stderr_tail: tail,
        })
    }
}
