// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Deepgram speech-to-text recognizer adapter.
//!
//! Streams raw call audio to Deepgram's live-transcription WebSocket
//! (`wss://api.deepgram.com/v1/listen`) and converts the result messages
//! into [`TranscriptFragment`]s: final results, interim results, and
//! utterance-end markers.
//!
//! The call leg is mu-law 8kHz mono, and the audio is forwarded verbatim
//! (base64-decoded only), so the stream is opened with `encoding=mulaw`
//! and `sample_rate=8000`.

use std::fmt;
use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::services::{AdapterError, RecognizerStream, SpeechRecognizer, TranscriptFragment};

/// Connection timeout for the vendor WebSocket.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Deepgram WebSocket JSON response types
// ---------------------------------------------------------------------------

/// Lightweight envelope to extract just the message type without allocating
/// a full serde_json::Value tree. The hot-path "Results" type then gets a
/// second parse into [`DgResult`].
#[derive(Deserialize)]
struct DgTypeOnly {
    #[serde(rename = "type")]
    msg_type: Option<String>,
}

/// One alternative transcription for a channel.
#[derive(Debug, Deserialize)]
struct DgAlternative {
    transcript: String,
    #[serde(default)]
    #[allow(dead_code)]
    confidence: f64,
}

/// A single channel's transcription results.
#[derive(Debug, Deserialize)]
struct DgChannel {
    alternatives: Vec<DgAlternative>,
}

/// Top-level transcription result message.
#[derive(Debug, Deserialize)]
struct DgResult {
    channel: Option<DgChannel>,
    is_final: Option<bool>,
    speech_final: Option<bool>,
}

/// Deepgram error response.
#[derive(Debug, Deserialize)]
struct DgError {
    description: Option<String>,
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Type aliases for the WebSocket split halves
// ---------------------------------------------------------------------------

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

// ---------------------------------------------------------------------------
// DeepgramRecognizer
// ---------------------------------------------------------------------------

/// Deepgram real-time speech recognizer.
///
/// # Example
///
/// ```rust,no_run
/// use centralita::services::deepgram::DeepgramRecognizer;
///
/// let recognizer = DeepgramRecognizer::new("dg-api-key")
///     .with_model("nova-2")
///     .with_language("es");
/// ```
pub struct DeepgramRecognizer {
    api_key: String,
    model: String,
    language: String,
    sample_rate: u32,
    encoding: String,
    channels: u32,
    interim_results: bool,
    punctuate: bool,
    utterance_end_ms: u32,
    /// Custom API base URL (without path). When `None`, uses the default
    /// `wss://api.deepgram.com`.
    base_url: Option<String>,
}

impl fmt::Debug for DeepgramRecognizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepgramRecognizer")
            .field("model", &self.model)
            .field("language", &self.language)
            .field("sample_rate", &self.sample_rate)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl DeepgramRecognizer {
    /// Create a recognizer with telephony defaults.
    ///
    /// Defaults: model `nova-2`, language `es`, `mulaw` at 8kHz mono,
    /// interim results and punctuation on, utterance end at 1000ms.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "nova-2".to_string(),
            language: "es".to_string(),
            sample_rate: 8000,
            encoding: "mulaw".to_string(),
            channels: 1,
            interim_results: true,
            punctuate: true,
            utterance_end_ms: 1000,
            base_url: None,
        }
    }

    /// Builder method: set the Deepgram model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Builder method: set the language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Builder method: set the audio sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Builder method: set the audio encoding string sent to Deepgram.
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    /// Builder method: set the utterance-end detection timeout in milliseconds.
    pub fn with_utterance_end_ms(mut self, ms: u32) -> Self {
        self.utterance_end_ms = ms;
        self
    }

    /// Builder method: set a custom API base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Build the WebSocket URL with query parameters.
    fn build_ws_url(&self) -> String {
        let host = self.base_url.as_deref().unwrap_or("wss://api.deepgram.com");
        let host = host.trim_end_matches('/');

        let mut url = format!(
            "{}/v1/listen?model={}&language={}&encoding={}&sample_rate={}&channels={}",
            host, self.model, self.language, self.encoding, self.sample_rate, self.channels,
        );

        if self.interim_results {
            url.push_str("&interim_results=true");
        }
        if self.punctuate {
            url.push_str("&punctuate=true");
        }
        let _ = write!(url, "&utterance_end_ms={}", self.utterance_end_ms);

        url
    }

    /// Background task that reads vendor messages and converts them into
    /// transcript fragments sent via `fragments`.
    async fn ws_reader_loop(mut stream: WsStream, fragments: mpsc::Sender<TranscriptFragment>) {
        while let Some(msg_result) = stream.next().await {
            let msg = match msg_result {
                Ok(m) => m,
                Err(e) => {
                    tracing::error!("Deepgram: WebSocket read error: {}", e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    if let Some(fragment) = Self::fragment_from_message(&text) {
                        if fragments.send(fragment).await.is_err() {
                            // Session gone; nothing left to deliver to.
                            break;
                        }
                    }
                }
                Message::Close(close_frame) => {
                    tracing::debug!("Deepgram: WebSocket closed by server: {:?}", close_frame);
                    break;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {
                    // Pings are handled automatically by tungstenite.
                }
                Message::Frame(_) => {}
            }
        }

        tracing::debug!("Deepgram: WebSocket reader loop ended");
    }

    /// Parse one vendor text message into a transcript fragment, if it
    /// carries one.
    fn fragment_from_message(text: &str) -> Option<TranscriptFragment> {
        let envelope: DgTypeOnly = match serde_json::from_str(text) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Deepgram: failed to parse message: {}: {}", e, text);
                return None;
            }
        };

        match envelope.msg_type.as_deref().unwrap_or("") {
            "Results" => {
                let result: DgResult = match serde_json::from_str(text) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Deepgram: failed to parse Results message: {}", e);
                        return None;
                    }
                };
                let transcript = result
                    .channel
                    .as_ref()
                    .and_then(|ch| ch.alternatives.first())
                    .map(|alt| alt.transcript.trim().to_string())
                    .unwrap_or_default();
                let is_final = result.is_final.unwrap_or(false);
                let speech_final = result.speech_final.unwrap_or(false);

                if transcript.is_empty() && !speech_final {
                    // Empty non-terminal results carry no information.
                    return None;
                }

                tracing::trace!(
                    is_final,
                    speech_final,
                    transcript = %transcript,
                    "Deepgram: transcription result"
                );
                Some(TranscriptFragment {
                    text: transcript,
                    is_final,
                    is_end_of_speech: speech_final,
                    timestamp: tokio::time::Instant::now(),
                })
            }
            "UtteranceEnd" => {
                tracing::debug!("Deepgram: utterance end event");
                Some(TranscriptFragment::end_of_speech(""))
            }
            "Metadata" => None,
            "Error" => {
                let description = serde_json::from_str::<DgError>(text)
                    .ok()
                    .and_then(|e| e.description.or(e.message))
                    .unwrap_or_else(|| "unknown Deepgram error".to_string());
                tracing::error!("Deepgram: error from server: {}", description);
                None
            }
            other => {
                tracing::trace!("Deepgram: unhandled message type: {}", other);
                None
            }
        }
    }
}

#[async_trait]
impl SpeechRecognizer for DeepgramRecognizer {
    async fn open_stream(
        &self,
        fragments: mpsc::Sender<TranscriptFragment>,
    ) -> Result<Box<dyn RecognizerStream>, AdapterError> {
        let url_str = self.build_ws_url();
        tracing::debug!("Deepgram: connecting to {}", url_str);

        let mut request = url_str
            .into_client_request()
            .map_err(|e| AdapterError::Recognition(format!("bad WebSocket request: {e}")))?;
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Token {}", self.api_key))
                .map_err(|e| AdapterError::Recognition(format!("bad API key header: {e}")))?,
        );

        let (ws_stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| AdapterError::Timeout("Deepgram connect"))?
            .map_err(|e| AdapterError::Recognition(format!("WebSocket connect failed: {e}")))?;

        tracing::debug!("Deepgram: WebSocket connection established");

        let (sink, stream) = ws_stream.split();
        let reader = tokio::spawn(Self::ws_reader_loop(stream, fragments));

        Ok(Box::new(DeepgramStream { sink, reader }))
    }
}

// ---------------------------------------------------------------------------
// DeepgramStream
// ---------------------------------------------------------------------------

/// One live Deepgram recognition stream.
pub struct DeepgramStream {
    sink: WsSink,
    reader: JoinHandle<()>,
}

#[async_trait]
impl RecognizerStream for DeepgramStream {
    async fn send_audio(&mut self, chunk: &[u8]) -> Result<(), AdapterError> {
        self.sink
            .send(Message::Binary(chunk.to_vec().into()))
            .await
            .map_err(|e| AdapterError::Recognition(format!("audio send failed: {e}")))
    }

    async fn finish(&mut self) -> Result<(), AdapterError> {
        // Deepgram's explicit termination message flushes pending results
        // before the server closes the socket.
        let close = r#"{"type": "CloseStream"}"#;
        if let Err(e) = self.sink.send(Message::Text(close.into())).await {
            tracing::debug!("Deepgram: CloseStream send failed (already closed?): {}", e);
        }
        let _ = self.sink.close().await;
        Ok(())
    }
}

impl Drop for DeepgramStream {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_ws_url_defaults() {
        let recognizer = DeepgramRecognizer::new("key");
        let url = recognizer.build_ws_url();
        assert!(url.starts_with("wss://api.deepgram.com/v1/listen?"));
        assert!(url.contains("model=nova-2"));
        assert!(url.contains("language=es"));
        assert!(url.contains("encoding=mulaw"));
        assert!(url.contains("sample_rate=8000"));
        assert!(url.contains("interim_results=true"));
        assert!(url.contains("punctuate=true"));
        assert!(url.contains("utterance_end_ms=1000"));
    }

    #[test]
    fn test_build_ws_url_custom_base() {
        let recognizer = DeepgramRecognizer::new("key").with_base_url("ws://localhost:9999/");
        let url = recognizer.build_ws_url();
        assert!(url.starts_with("ws://localhost:9999/v1/listen?"));
    }

    #[tokio::test]
    async fn test_fragment_from_final_result() {
        let json = r#"{
            "type": "Results",
            "channel": {"alternatives": [{"transcript": "hola, soy Juan", "confidence": 0.98}]},
            "is_final": true,
            "speech_final": false
        }"#;

        let fragment = DeepgramRecognizer::fragment_from_message(json).expect("fragment");
        assert_eq!(fragment.text, "hola, soy Juan");
        assert!(fragment.is_final);
        assert!(!fragment.is_end_of_speech);
    }

    #[tokio::test]
    async fn test_fragment_from_speech_final() {
        let json = r#"{
            "type": "Results",
            "channel": {"alternatives": [{"transcript": "del portal", "confidence": 0.9}]},
            "is_final": true,
            "speech_final": true
        }"#;

        let fragment = DeepgramRecognizer::fragment_from_message(json).expect("fragment");
        assert!(fragment.is_final);
        assert!(fragment.is_end_of_speech);
    }

    #[tokio::test]
    async fn test_fragment_from_interim_result() {
        let json = r#"{
            "type": "Results",
            "channel": {"alternatives": [{"transcript": "hola", "confidence": 0.5}]},
            "is_final": false,
            "speech_final": false
        }"#;

        let fragment = DeepgramRecognizer::fragment_from_message(json).expect("fragment");
        assert!(!fragment.is_final);
        assert!(!fragment.is_end_of_speech);
    }

    #[tokio::test]
    async fn test_empty_interim_result_dropped() {
        let json = r#"{
            "type": "Results",
            "channel": {"alternatives": [{"transcript": "", "confidence": 0.0}]},
            "is_final": false,
            "speech_final": false
        }"#;

        assert!(DeepgramRecognizer::fragment_from_message(json).is_none());
    }

    #[tokio::test]
    async fn test_utterance_end_marker() {
        let json = r#"{"type": "UtteranceEnd", "channel": [0, 1], "last_word_end": 3.1}"#;
        let fragment = DeepgramRecognizer::fragment_from_message(json).expect("fragment");
        assert!(fragment.text.is_empty());
        assert!(fragment.is_end_of_speech);
    }

    #[tokio::test]
    async fn test_metadata_and_errors_produce_no_fragment() {
        assert!(DeepgramRecognizer::fragment_from_message(r#"{"type": "Metadata"}"#).is_none());
        assert!(DeepgramRecognizer::fragment_from_message(
            r#"{"type": "Error", "description": "bad things"}"#
        )
        .is_none());
        assert!(DeepgramRecognizer::fragment_from_message("not json").is_none());
    }
}
