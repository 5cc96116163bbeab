// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! ElevenLabs text-to-speech synthesizer adapter.
//!
//! HTTP-based synthesis using `POST /v1/text-to-speech/{voice_id}`. The
//! complete audio response (MP3 by default) is buffered and handed to the
//! transcoder, which converts it to the call's wire codec.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::services::{AdapterError, Synthesizer};

/// Request timeout for one synthesis call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Responses smaller than this cannot be playable audio; treat them as a
/// vendor failure even on a 2xx status.
const MIN_AUDIO_BYTES: usize = 128;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Voice settings for synthesis.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceSettings {
    pub stability: f64,
    pub similarity_boost: f64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

/// Body sent to the synthesis endpoint.
#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

// ---------------------------------------------------------------------------
// ElevenLabsSynthesizer
// ---------------------------------------------------------------------------

/// ElevenLabs HTTP TTS synthesizer.
///
/// # Example
///
/// ```rust,no_run
/// use centralita::services::elevenlabs::ElevenLabsSynthesizer;
///
/// let tts = ElevenLabsSynthesizer::new("xi-api-key", "EXAVITQu4vr4xnSDxMaL")
///     .with_model("eleven_multilingual_v2");
/// ```
pub struct ElevenLabsSynthesizer {
    api_key: String,
    voice_id: String,
    model: String,
    voice_settings: VoiceSettings,
    base_url: String,
    client: reqwest::Client,
}

impl fmt::Debug for ElevenLabsSynthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevenLabsSynthesizer")
            .field("voice_id", &self.voice_id)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ElevenLabsSynthesizer {
    /// Create a synthesizer for the given voice.
    pub fn new(api_key: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            voice_id: voice_id.into(),
            model: "eleven_multilingual_v2".to_string(),
            voice_settings: VoiceSettings::default(),
            base_url: "https://api.elevenlabs.io".to_string(),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Builder method: set the synthesis model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Builder method: set the voice settings.
    pub fn with_voice_settings(mut self, settings: VoiceSettings) -> Self {
        self.voice_settings = settings;
        self
    }

    /// Builder method: set a custom API base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, AdapterError> {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id);
        let request = SynthesisRequest {
            text,
            model_id: &self.model,
            voice_settings: &self.voice_settings,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Synthesis(format!(
                "TTS returned {status}: {body}"
            )));
        }

        let audio = response.bytes().await?.to_vec();
        if audio.len() < MIN_AUDIO_BYTES {
            return Err(AdapterError::Synthesis(format!(
                "TTS returned undersized audio ({} bytes)",
                audio.len()
            )));
        }

        tracing::debug!(bytes = audio.len(), chars = text.len(), "synthesis complete");
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let settings = VoiceSettings::default();
        let request = SynthesisRequest {
            text: "Hola, ¿con quién tengo el gusto?",
            model_id: "eleven_multilingual_v2",
            voice_settings: &settings,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["text"], "Hola, ¿con quién tengo el gusto?");
        assert_eq!(json["model_id"], "eleven_multilingual_v2");
        assert_eq!(json["voice_settings"]["stability"], 0.5);
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let tts = ElevenLabsSynthesizer::new("k", "v").with_base_url("http://localhost:9999/");
        assert_eq!(tts.base_url, "http://localhost:9999");
    }
}
