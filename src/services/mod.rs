// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! External service adapters (recognition, response generation, synthesis,
//! transcoding) and the ticket sink.
//!
//! Each adapter is a narrow, replaceable capability behind an object-safe
//! trait. Adapters are stateless and shared read-only across sessions via
//! `Arc<dyn ...>`; per-call state (the recognizer's WebSocket) lives in the
//! stream value the adapter hands out. Every call carries a bounded timeout,
//! so a stuck vendor degrades to a per-turn error instead of wedging the
//! session.

pub mod deepgram;
pub mod elevenlabs;
pub mod ffmpeg;
pub mod openai;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::ticket::Ticket;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced by the external-service adapters.
///
/// These are per-turn failures: the turn executor logs them and drops the
/// turn, leaving the session able to retry on the next utterance.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("recognizer error: {0}")]
    Recognition(String),
    #[error("responder error: {0}")]
    Responder(String),
    #[error("synthesizer error: {0}")]
    Synthesis(String),
    #[error("transcoder exited with {status}: {stderr}")]
    Transcode { status: i32, stderr: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} timed out")]
    Timeout(&'static str),
}

// ---------------------------------------------------------------------------
// Transcript fragments
// ---------------------------------------------------------------------------

/// One transcription result emitted by the recognizer.
///
/// Ephemeral: produced by the recognizer's reader task, consumed immediately
/// by the session's aggregator.
#[derive(Debug, Clone)]
pub struct TranscriptFragment {
    /// Transcribed text; may be empty for pure end-of-speech markers.
    pub text: String,
    /// Whether this text is finalized (interim results may still change).
    pub is_final: bool,
    /// Whether the recognizer considers the utterance complete.
    pub is_end_of_speech: bool,
    /// Arrival timestamp.
    pub timestamp: Instant,
}

impl TranscriptFragment {
    /// A finalized fragment.
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            is_end_of_speech: false,
            timestamp: Instant::now(),
        }
    }

    /// An interim (still mutable) fragment.
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            is_end_of_speech: false,
            timestamp: Instant::now(),
        }
    }

    /// An end-of-speech marker, optionally carrying final text.
    pub fn end_of_speech(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            is_end_of_speech: true,
            timestamp: Instant::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter contracts
// ---------------------------------------------------------------------------

/// Streaming speech recognition.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Open a recognition stream for one call.
    ///
    /// Transcript fragments are delivered in order through `fragments` until
    /// the stream is finished or the vendor closes it.
    async fn open_stream(
        &self,
        fragments: mpsc::Sender<TranscriptFragment>,
    ) -> Result<Box<dyn RecognizerStream>, AdapterError>;
}

/// One live recognition stream.
#[async_trait]
pub trait RecognizerStream: Send {
    /// Forward one chunk of raw inbound call audio.
    async fn send_audio(&mut self, chunk: &[u8]) -> Result<(), AdapterError>;

    /// Terminate the stream explicitly, flushing any pending results.
    async fn finish(&mut self) -> Result<(), AdapterError>;
}

/// Conversation context handed to the responder.
#[derive(Debug, Clone, Default)]
pub struct ResponderContext {
    /// Normalized caller name, once captured.
    pub caller_identity: Option<String>,
    /// Captured reason for the call, once accepted.
    pub captured_reason: Option<String>,
}

/// Reply-text generation.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Produce a short conversational reply to `utterance`.
    async fn reply(
        &self,
        utterance: &str,
        context: &ResponderContext,
    ) -> Result<String, AdapterError>;

    /// Produce the raw classification payload for a captured reason.
    ///
    /// The output is model text; [`openai::parse_classification`] extracts
    /// and validates the structured part, falling back to defaults.
    async fn classify(
        &self,
        reason: &str,
        context: &ResponderContext,
    ) -> Result<String, AdapterError>;
}

/// Text-to-speech synthesis.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Convert reply text into an audio buffer (vendor codec).
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, AdapterError>;
}

/// Audio transcoding into the call's wire codec.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert a synthesized audio buffer into the outbound codec/rate.
    async fn transcode(&self, audio: &[u8]) -> Result<Vec<u8>, AdapterError>;
}

/// Ticket submission sink.
#[async_trait]
pub trait TicketSink: Send + Sync {
    /// Deliver one ticket. At-most-once: failures are logged by the caller
    /// and never retried.
    async fn submit(&self, ticket: &Ticket) -> Result<(), AdapterError>;
}
