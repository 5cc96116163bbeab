// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Media-stream wire protocol.
//!
//! Handles the telephony media-stream WebSocket protocol (the Twilio Media
//! Streams JSON dialect). Incoming messages are one of three event kinds:
//!
//! - `start` - stream started, carries the `streamSid` and optional caller
//!   metadata in `customParameters`
//! - `media` - audio payload as base64-encoded mu-law at 8kHz mono
//! - `stop` - stream stopped
//!
//! Outgoing messages are:
//!
//! - `media` - base64-encoded audio frame for playback
//! - `clear` - flush the carrier's playback queue (barge-in)
//!
//! Unknown inbound event kinds are ignored by design; malformed JSON is
//! dropped without producing an event.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::util::{decode_base64, encode_base64};

// ---------------------------------------------------------------------------
// Inbound wire-format types
// ---------------------------------------------------------------------------

/// Top-level media-stream WebSocket message (incoming).
#[derive(Deserialize, Debug)]
struct StreamMessage {
    event: String,
    #[serde(default)]
    start: Option<StartPayload>,
    #[serde(default)]
    media: Option<MediaPayload>,
    #[serde(rename = "streamSid", default)]
    #[allow(dead_code)]
    stream_sid: Option<String>,
}

/// Payload for the "start" event.
#[derive(Deserialize, Debug)]
struct StartPayload {
    #[serde(rename = "streamSid")]
    stream_sid: String,
    #[serde(rename = "callSid", default)]
    call_sid: Option<String>,
    #[serde(rename = "customParameters", default)]
    custom_parameters: Option<HashMap<String, String>>,
}

/// Payload for the "media" event.
#[derive(Deserialize, Debug)]
struct MediaPayload {
    payload: String,
}

// ---------------------------------------------------------------------------
// Closed inbound/outbound event types
// ---------------------------------------------------------------------------

/// A parsed inbound transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Stream started; the session identifier is now known.
    Start(StartEvent),
    /// One chunk of inbound call audio, already base64-decoded.
    Media(MediaEvent),
    /// Stream ended.
    Stop,
}

/// Session-start metadata extracted from the `start` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartEvent {
    /// Opaque stream identifier used to address outbound events.
    pub stream_sid: String,
    /// Call identifier, when the carrier provides one.
    pub call_sid: Option<String>,
    /// Caller phone number, when passed through as a custom parameter.
    pub caller: Option<String>,
}

/// One decoded chunk of inbound audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEvent {
    /// Raw audio bytes in the call's wire codec (mu-law 8kHz mono).
    pub audio: Vec<u8>,
}

/// An outbound transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// One frame of playback audio.
    Media {
        stream_sid: String,
        /// Raw audio bytes in the wire codec; base64-encoded on serialize.
        audio: Vec<u8>,
    },
    /// Cancel whatever the carrier is still playing (barge-in).
    Clear { stream_sid: String },
}

// ---------------------------------------------------------------------------
// Outgoing wire-format types
// ---------------------------------------------------------------------------

/// Outgoing media message.
#[derive(Serialize)]
struct MediaOut<'a> {
    event: &'a str,
    #[serde(rename = "streamSid")]
    stream_sid: &'a str,
    media: MediaPayloadOut,
}

/// Outgoing media payload.
#[derive(Serialize)]
struct MediaPayloadOut {
    payload: String,
}

/// Outgoing clear message.
#[derive(Serialize)]
struct ClearOut<'a> {
    event: &'a str,
    #[serde(rename = "streamSid")]
    stream_sid: &'a str,
}

// ---------------------------------------------------------------------------
// Parse / serialize
// ---------------------------------------------------------------------------

/// Parse one inbound WebSocket text message into an [`InboundEvent`].
///
/// Returns `None` for malformed JSON, unknown event kinds, and events with a
/// missing payload. Dropping these silently is deliberate: a bad frame from
/// the carrier must never take the session down.
pub fn parse_inbound(text: &str) -> Option<InboundEvent> {
    let msg: StreamMessage = serde_json::from_str(text).ok()?;

    match msg.event.as_str() {
        "start" => {
            let start = match msg.start {
                Some(s) => s,
                None => {
                    warn!("start event missing start payload");
                    return None;
                }
            };
            let caller = start
                .custom_parameters
                .as_ref()
                .and_then(|p| p.get("from").or_else(|| p.get("caller")))
                .cloned();
            Some(InboundEvent::Start(StartEvent {
                stream_sid: start.stream_sid,
                call_sid: start.call_sid,
                caller,
            }))
        }
        "media" => {
            let media = msg.media?;
            let audio = match decode_base64(&media.payload) {
                Some(bytes) => bytes,
                None => {
                    warn!("media event with undecodable base64 payload");
                    return None;
                }
            };
            Some(InboundEvent::Media(MediaEvent { audio }))
        }
        "stop" => Some(InboundEvent::Stop),
        "connected" => {
            // Informational handshake message; no event produced.
            debug!("carrier connected");
            None
        }
        other => {
            debug!(event = other, "ignoring unknown inbound event kind");
            None
        }
    }
}

impl OutboundEvent {
    /// Serialize this event to the wire JSON.
    pub fn to_json(&self) -> String {
        match self {
            OutboundEvent::Media { stream_sid, audio } => {
                let msg = MediaOut {
                    event: "media",
                    stream_sid,
                    media: MediaPayloadOut {
                        payload: encode_base64(audio),
                    },
                };
                // Serialization of these closed structs cannot fail.
                serde_json::to_string(&msg).unwrap_or_default()
            }
            OutboundEvent::Clear { stream_sid } => {
                let msg = ClearOut {
                    event: "clear",
                    stream_sid,
                };
                serde_json::to_string(&msg).unwrap_or_default()
            }
        }
    }

    /// The stream this event addresses.
    pub fn stream_sid(&self) -> &str {
        match self {
            OutboundEvent::Media { stream_sid, .. } => stream_sid,
            OutboundEvent::Clear { stream_sid } => stream_sid,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
