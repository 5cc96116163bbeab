// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! ffmpeg transcoder adapter.
//!
//! Converts a synthesized audio buffer (whatever codec the synthesizer
//! returns) into the call leg's wire codec: raw mu-law, 8kHz, mono. The
//! conversion runs as a finite child process per turn: the full input is
//! written to stdin, stdin is closed, stdout is drained until the process
//! exits. A non-zero exit is fatal for the turn and carries the captured
//! stderr as diagnostics.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::services::{AdapterError, Transcoder};

/// Upper bound for one transcode run; a hung child must not wedge the turn.
const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(15);

/// Transcoder that shells out to ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: String,
    sample_rate: u32,
}

impl FfmpegTranscoder {
    /// Create a transcoder using the given ffmpeg executable.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            sample_rate: 8000,
        }
    }

    /// Builder method: set the output sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    async fn run(&self, audio: &[u8]) -> Result<Vec<u8>, AdapterError> {
        let mut child = Command::new(&self.binary)
            .arg("-hide_banner")
            .args(["-loglevel", "error"])
            .args(["-i", "pipe:0"])
            .args(["-f", "mulaw"])
            .args(["-ar", &self.sample_rate.to_string()])
            .args(["-ac", "1"])
            .arg("pipe:1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AdapterError::Synthesis("transcoder stdin unavailable".into()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| AdapterError::Synthesis("transcoder stdout unavailable".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| AdapterError::Synthesis("transcoder stderr unavailable".into()))?;

        // Write and read concurrently: ffmpeg starts emitting output before
        // consuming all input, and a full pipe on either side would deadlock
        // a sequential write-then-read.
        let input = audio.to_vec();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin); // close the input side so the child can finish
            result
        });

        let mut output = Vec::new();
        let mut diagnostics = Vec::new();
        let (out_read, err_read) = tokio::join!(
            stdout.read_to_end(&mut output),
            stderr.read_to_end(&mut diagnostics),
        );
        out_read?;
        err_read?;

        let status = child.wait().await?;
        if let Ok(Err(e)) = writer.await {
            // A broken pipe here usually accompanies a non-zero exit below;
            // report it only when the child claims success.
            if status.success() {
                return Err(AdapterError::Io(e));
            }
        }

        if !status.success() {
            return Err(AdapterError::Transcode {
                status: status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&diagnostics).trim().to_string(),
            });
        }

        tracing::debug!(
            in_bytes = audio.len(),
            out_bytes = output.len(),
            "transcode complete"
        );
        Ok(output)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, audio: &[u8]) -> Result<Vec<u8>, AdapterError> {
        tokio::time::timeout(TRANSCODE_TIMEOUT, self.run(audio))
            .await
            .map_err(|_| AdapterError::Timeout("transcode"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests use universally available shell tools in place of ffmpeg;
    // the adapter only cares about the pipe-and-exit-status contract.

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let transcoder = FfmpegTranscoder::new("/nonexistent/ffmpeg-binary");
        let result = transcoder.transcode(b"audio").await;
        assert!(matches!(result, Err(AdapterError::Io(_))));
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        // `sh` rejects the ffmpeg-style flags and exits non-zero after
        // complaining on stderr, which is exactly the failure shape the
        // adapter must surface.
        let transcoder = FfmpegTranscoder {
            binary: "sh".to_string(),
            sample_rate: 8000,
        };
        let result = transcoder.transcode(b"audio").await;
        match result {
            Err(AdapterError::Transcode { status, .. }) => assert_ne!(status, 0),
            other => panic!("expected Transcode error, got {:?}", other),
        }
    }
}
