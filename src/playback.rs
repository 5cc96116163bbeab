// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Playback scheduling: framing and real-time pacing of outbound audio.
//!
//! The transcoded reply arrives as one buffer already in the wire codec.
//! It is split into fixed-duration frames and emitted at a live cadence,
//! one frame duration apart, so the carrier hears speech in real time
//! rather than receiving a burst.
//!
//! Cancellation is polled between frames: before each send the scheduler
//! checks that the sink is alive, the turn generation is still current, and
//! the session still owns the voice channel. Any failed check stops playback
//! immediately — that is normal barge-in/teardown, not a fault — which bounds
//! cancellation latency to one frame duration.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::events::OutboundEvent;
use crate::session::Session;

/// Frame geometry for the outbound call leg.
#[derive(Debug, Clone, Copy)]
pub struct FrameGeometry {
    /// Samples per second on the wire.
    pub sample_rate: u32,
    /// Duration of one frame.
    pub frame_duration: Duration,
    /// Bytes per sample (mu-law: 1).
    pub bytes_per_sample: usize,
}

impl FrameGeometry {
    /// Telephony reference configuration: 8kHz mono mu-law, 20ms frames.
    pub const TELEPHONY: FrameGeometry = FrameGeometry {
        sample_rate: 8000,
        frame_duration: Duration::from_millis(20),
        bytes_per_sample: 1,
    };

    /// Bytes in one full frame.
    pub fn frame_bytes(&self) -> usize {
        let samples = (self.sample_rate as u128 * self.frame_duration.as_millis()) / 1000;
        (samples as usize) * self.bytes_per_sample
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self::TELEPHONY
    }
}

/// How a playback run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackOutcome {
    /// Frames actually emitted.
    pub frames_sent: usize,
    /// True when the whole buffer was played; false when cancelled.
    pub completed: bool,
}

/// Play one audio buffer to the session's outbound sink, paced in real time.
///
/// `generation` is the turn generation that owns this playback; a bump (new
/// turn) or a cleared `speaking` flag (barge-in) stops the run at the next
/// frame boundary.
pub async fn play(
    audio: &[u8],
    sink: &mpsc::Sender<OutboundEvent>,
    session: &Session,
    generation: u64,
    stream_sid: &str,
    geometry: FrameGeometry,
) -> PlaybackOutcome {
    let frame_bytes = geometry.frame_bytes().max(1);
    let total_frames = audio.len().div_ceil(frame_bytes);
    let mut frames_sent = 0usize;

    let mut frames = audio.chunks(frame_bytes).peekable();
    while let Some(frame) = frames.next() {
        let cancelled = sink.is_closed()
            || session.generation() != generation
            || !session.is_speaking();
        if cancelled {
            tracing::debug!(
                frames_sent,
                total_frames,
                "playback cancelled before completion"
            );
            return PlaybackOutcome { frames_sent, completed: false };
        }

        let event = OutboundEvent::Media {
            stream_sid: stream_sid.to_string(),
            audio: frame.to_vec(),
        };
        if sink.send(event).await.is_err() {
            tracing::debug!(frames_sent, "outbound sink closed mid-playback");
            return PlaybackOutcome { frames_sent, completed: false };
        }
        frames_sent += 1;

        // Pace: one frame duration between sends. The terminal (possibly
        // partial) frame needs no trailing sleep.
        if frames.peek().is_some() {
            tokio::time::sleep(geometry.frame_duration).await;
        }
    }

    PlaybackOutcome { frames_sent, completed: true }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn telephony() -> FrameGeometry {
        FrameGeometry::TELEPHONY
    }

    #[test]
    fn test_frame_bytes_reference_configuration() {
        // 8000 Hz x 0.020 s x 1 byte = 160 bytes per frame.
        assert_eq!(telephony().frame_bytes(), 160);
    }

    #[test]
    fn test_frame_bytes_other_geometries() {
        let wideband = FrameGeometry {
            sample_rate: 16000,
            frame_duration: Duration::from_millis(20),
            bytes_per_sample: 2,
        };
        assert_eq!(wideband.frame_bytes(), 640);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_buffer_plays_to_completion() {
        let session = Session::new();
        let guard = session.begin_turn().unwrap();
        let (tx, mut rx) = mpsc::channel(64);

        // 3 full frames plus a 40-byte terminal partial.
        let audio = vec![0xFFu8; 160 * 3 + 40];
        let outcome = play(&audio, &tx, &session, guard.generation(), "MZ1", telephony()).await;

        assert!(outcome.completed);
        assert_eq!(outcome.frames_sent, 4);

        let mut sizes = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                OutboundEvent::Media { audio, .. } => sizes.push(audio.len()),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(sizes, vec![160, 160, 160, 40]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_are_paced_one_frame_apart() {
        let session = Session::new();
        let guard = session.begin_turn().unwrap();
        let (tx, mut rx) = mpsc::channel(64);

        let start = Instant::now();
        let audio = vec![0u8; 160 * 5];
        let outcome = play(&audio, &tx, &session, guard.generation(), "MZ1", telephony()).await;

        assert!(outcome.completed);
        assert_eq!(outcome.frames_sent, 5);
        // 5 frames with 4 inter-frame gaps of 20ms.
        assert_eq!(start.elapsed(), Duration::from_millis(80));

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_bump_cancels() {
        let session = Session::new();
        let guard = session.begin_turn().unwrap();
        let generation = guard.generation();
        let (tx, mut rx) = mpsc::channel(1024);

        let audio = vec![0u8; 160 * 10];
        let session_for_play = std::sync::Arc::clone(&session);
        let play_task = tokio::spawn(async move {
            play(&audio, &tx, &session_for_play, generation, "MZ1", telephony()).await
        });

        // Let a few frames out, then supersede the turn.
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(guard);
        let _next = session.begin_turn().unwrap();

        let outcome = play_task.await.unwrap();
        assert!(!outcome.completed);
        assert!(outcome.frames_sent < 10);

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, outcome.frames_sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_barge_in_stops_within_one_frame() {
        let session = Session::new();
        let guard = session.begin_turn().unwrap();
        let generation = guard.generation();
        let (tx, _rx) = mpsc::channel(1024);

        let audio = vec![0u8; 160 * 100];
        let session_for_play = std::sync::Arc::clone(&session);
        let play_task = tokio::spawn(async move {
            play(&audio, &tx, &session_for_play, generation, "MZ1", telephony()).await
        });

        tokio::time::sleep(Duration::from_millis(45)).await;
        let frames_at_cancel = 3; // sends at t=0, 20, 40ms
        session.cancel_speech();

        let outcome = play_task.await.unwrap();
        assert!(!outcome.completed);
        // The frame in flight when the flag flipped may still go out, but
        // nothing after it: the bound is one frame duration.
        assert!(
            outcome.frames_sent <= frames_at_cancel + 1,
            "sent {} frames after cancel at ~3",
            outcome.frames_sent
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_sink_stops_playback() {
        let session = Session::new();
        let guard = session.begin_turn().unwrap();
        let (tx, rx) = mpsc::channel(4);
        drop(rx);

        let audio = vec![0u8; 160 * 3];
        let outcome = play(&audio, &tx, &session, guard.generation(), "MZ1", telephony()).await;
        assert!(!outcome.completed);
        assert_eq!(outcome.frames_sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_buffer_completes_immediately() {
        let session = Session::new();
        let guard = session.begin_turn().unwrap();
        let (tx, _rx) = mpsc::channel(4);

        let outcome = play(&[], &tx, &session, guard.generation(), "MZ1", telephony()).await;
        assert!(outcome.completed);
        assert_eq!(outcome.frames_sent, 0);
    }
}
