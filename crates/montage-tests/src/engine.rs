//! In-process stand-in for ffmpeg/ffprobe.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use montage_media::{
    CancelToken, EngineError, EngineInvocation, EngineOutput, EngineProgram, EngineResult,
    MediaEngine,
};
use parking_lot::Mutex;

/// What `ffprobe` reports for every file: two minutes at 30 fps.
pub const PROBE_JSON: &str = r#"{
    "streams": [
        {"codec_type": "video", "codec_name": "h264",
         "width": 1920, "height": 1080, "r_frame_rate": "30/1"},
        {"codec_type": "audio", "codec_name": "aac"}
    ],
    "format": {"duration": "120.0"}
}"#;

#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Ok,
    Transient,
    /// Read error on the source, reported as an I/O failure.
    IoError,
    Fatal,
    Delay(Duration),
    /// Blocks until the job is cancelled.
    Hang,
}

/// Replies from a queue, then succeeds. Records every invocation.
#[derive(Default)]
pub struct FakeEngine {
    replies: Mutex<VecDeque<Reply>>,
    invocations: Mutex<Vec<EngineInvocation>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn invocations(&self, program: EngineProgram) -> Vec<EngineInvocation> {
        self.invocations
            .lock()
            .iter()
            .filter(|inv| inv.program == program)
            .cloned()
            .collect()
    }

    fn output(invocation: &EngineInvocation) -> EngineOutput {
        EngineOutput {
            stdout: match invocation.program {
                EngineProgram::Ffprobe => PROBE_JSON.as_bytes().to_vec(),
                EngineProgram::Ffmpeg => Vec::new(),
            },
            stderr_tail: String::new(),
        }
    }

    fn exit(stderr_tail: &str) -> EngineError {
        EngineError::Exit {
            program: "ffmpeg".into(),
            code: Some(1),
            stderr_tail: stderr_tail.into(),
        }
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn run(
        &self,
        invocation: &EngineInvocation,
        cancel: &CancelToken,
    ) -> EngineResult<EngineOutput> {
        self.invocations.lock().push(invocation.clone());
        let reply = self.replies.lock().pop_front().unwrap_or(Reply::Ok);
        match reply {
            Reply::Ok => Ok(Self::output(invocation)),
            Reply::Transient => Err(Self::exit("Connection reset by peer")),
            Reply::IoError => Err(EngineError::Io(std::io::Error::other(
                "Input/output error reading source",
            ))),
            Reply::Fatal => Err(Self::exit("moov atom not found")),
            Reply::Delay(delay) => tokio::select! {
                _ = cancel.cancelled() => Err(EngineError::Cancelled),
                _ = tokio::time::sleep(delay) => Ok(Self::output(invocation)),
            },
            Reply::Hang => {
                cancel.cancelled().await;
                Err(EngineError::Cancelled)
            }
        }
    }
}
