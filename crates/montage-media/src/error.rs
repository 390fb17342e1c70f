//! Errors raised by the external media engine.

use std::io;
use thiserror::Error;

/// Lines of stderr kept in failure reasons.
pub const STDERR_TAIL_LINES: usize = 20;

/// stderr fragments that indicate a condition worth retrying.
const TRANSIENT_MARKERS: &[&str] = &[
    "resource temporarily unavailable",
    "device or resource busy",
    "cannot allocate memory",
    "connection reset",
    "connection refused",
    "timed out",
    "broken pipe",
    "i/o error",
];

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} not found: {reason}")]
    MissingBinary { program: String, reason: String },

    #[error("{program} exited with {}: {stderr_tail}", exit_label(.code))]
    Exit {
        program: String,
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("malformed engine output: {0}")]
    Malformed(String),

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

impl EngineError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            // The binary was resolved before spawning, so this is host pressure
            Self::Spawn { .. } => true,
            Self::MissingBinary { .. } | Self::Malformed(_) | Self::Cancelled => false,
            // Killed by a signal (OOM killer, host pressure)
            Self::Exit { code: None, .. } => true,
            Self::Exit { stderr_tail, .. } => {
                let lower = stderr_tail.to_lowercase();
                TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
            }
            Self::Io(_) => true,
        }
    }
}

/// Last `max_lines` non-empty lines of a process's stderr.
pub fn stderr_tail(stderr: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let skip = lines.len().saturating_sub(max_lines);
    lines[skip..].join("\n")
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
