// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Environment configuration surface.
//!
//! All configuration is read once at startup into a [`Settings`] value and
//! passed down by reference; nothing in the session path touches the process
//! environment afterwards.

use std::env;
use std::time::Duration;

/// Error raised when the environment is missing or malformed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Process-wide configuration, resolved from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// HTTP/WebSocket listen port.
    pub port: u16,
    /// Deepgram recognizer credential.
    pub deepgram_api_key: String,
    /// Deepgram model identifier.
    pub deepgram_model: String,
    /// OpenAI responder credential.
    pub openai_api_key: String,
    /// OpenAI chat model identifier.
    pub openai_model: String,
    /// ElevenLabs synthesizer credential.
    pub elevenlabs_api_key: String,
    /// ElevenLabs voice identifier.
    pub elevenlabs_voice_id: String,
    /// ElevenLabs synthesis model identifier.
    pub elevenlabs_model: String,
    /// End-of-turn silence threshold.
    pub silence_threshold: Duration,
    /// Outbound playback frame duration.
    pub frame_duration: Duration,
    /// Ticket sink URL; `None` disables submission (tickets are logged only).
    pub ticket_webhook_url: Option<String>,
    /// Transcoder executable.
    pub ffmpeg_bin: String,
}

impl Settings {
    /// Resolve settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: parse_var("PORT", 8765)?,
            deepgram_api_key: require("DEEPGRAM_API_KEY")?,
            deepgram_model: var_or("DEEPGRAM_MODEL", "nova-2"),
            openai_api_key: require("OPENAI_API_KEY")?,
            openai_model: var_or("OPENAI_MODEL", "gpt-4o-mini"),
            elevenlabs_api_key: require("ELEVENLABS_API_KEY")?,
            elevenlabs_voice_id: var_or("ELEVENLABS_VOICE_ID", "EXAVITQu4vr4xnSDxMaL"),
            elevenlabs_model: var_or("ELEVENLABS_MODEL", "eleven_multilingual_v2"),
            silence_threshold: Duration::from_millis(parse_var("SILENCE_THRESHOLD_MS", 700u64)?),
            frame_duration: Duration::from_millis(parse_var("FRAME_DURATION_MS", 20u64)?),
            ticket_webhook_url: env::var("TICKET_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            ffmpeg_bin: var_or("FFMPEG_BIN", "ffmpeg"),
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => {
            value.parse().map_err(|_| ConfigError::Invalid { name, value })
        }
        _ => Ok(default),
    }
}
