// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Transcript aggregation and end-of-turn detection.
//!
//! Finalized transcript fragments accumulate here until the caller is judged
//! to have finished speaking. End-of-turn fires when either the recognizer
//! signals end-of-speech explicitly, or the buffer is non-empty and the
//! configured silence threshold has elapsed since the last final fragment.
//!
//! The aggregator itself is time-source agnostic: the orchestrator's select
//! loop asks for [`TranscriptAggregator::deadline`] and arms a timer only
//! when there is buffered text to close.

use std::time::Duration;

use tokio::time::Instant;

/// Default silence threshold after the last final fragment.
pub const DEFAULT_SILENCE_THRESHOLD: Duration = Duration::from_millis(700);

/// Buffers finalized transcript text and decides end-of-turn.
#[derive(Debug)]
pub struct TranscriptAggregator {
    buffer: Vec<String>,
    last_final: Option<Instant>,
    silence_threshold: Duration,
}

impl TranscriptAggregator {
    /// Create an aggregator with the given silence threshold.
    pub fn new(silence_threshold: Duration) -> Self {
        Self {
            buffer: Vec::new(),
            last_final: None,
            silence_threshold,
        }
    }

    /// Append one finalized fragment and update the silence clock.
    ///
    /// Empty text still refreshes the clock: the recognizer saw speech
    /// activity worth timing even if it transcribed nothing.
    pub fn push_final(&mut self, text: &str, at: Instant) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.buffer.push(trimmed.to_string());
        }
        self.last_final = Some(at);
    }

    /// Whether any finalized text is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The instant at which silence alone closes the turn, if a timer is
    /// warranted (buffer non-empty).
    pub fn deadline(&self) -> Option<Instant> {
        if self.buffer.is_empty() {
            return None;
        }
        self.last_final.map(|t| t + self.silence_threshold)
    }

    /// The end-of-turn law: true iff the buffer is non-empty and the silence
    /// threshold has elapsed since the last final fragment.
    ///
    /// The other half of the law — an explicit end-of-speech signal — is
    /// decided by the caller directly from the fragment flag.
    pub fn silence_elapsed(&self, now: Instant) -> bool {
        match self.last_final {
            Some(last) if !self.buffer.is_empty() => now.duration_since(last) > self.silence_threshold,
            _ => false,
        }
    }

    /// Take the aggregated utterance, clearing the buffer for the next turn.
    pub fn take(&mut self) -> String {
        let text = self.buffer.join(" ");
        self.buffer.clear();
        self.last_final = None;
        text
    }
}

impl Default for TranscriptAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_SILENCE_THRESHOLD)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fragments_join_with_spaces() {
        let mut agg = TranscriptAggregator::default();
        agg.push_final("no puedo acceder", Instant::now());
        agg.push_final("a mi contraseña", Instant::now());
        assert_eq!(agg.take(), "no puedo acceder a mi contraseña");
        assert!(agg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_buffer_never_closes_on_silence() {
        let agg = TranscriptAggregator::default();
        assert!(!agg.silence_elapsed(Instant::now() + millis(10_000)));
        assert!(agg.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_threshold_boundary() {
        // Synthetic timestamp sequence around the 700ms boundary: the law is
        // strict "greater than", so exactly-at-threshold does not close.
        let mut agg = TranscriptAggregator::new(millis(700));
        let t0 = Instant::now();
        agg.push_final("hola", t0);

        assert!(!agg.silence_elapsed(t0 + millis(699)));
        assert!(!agg.silence_elapsed(t0 + millis(700)));
        assert!(agg.silence_elapsed(t0 + millis(701)));
        assert!(agg.silence_elapsed(t0 + millis(5_000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_fragment_pushes_deadline_out() {
        let mut agg = TranscriptAggregator::new(millis(700));
        let t0 = Instant::now();
        agg.push_final("tengo un problema", t0);
        agg.push_final("con mi nómina", t0 + millis(500));

        // 800ms after the first fragment is only 300ms after the second.
        assert!(!agg.silence_elapsed(t0 + millis(800)));
        assert!(agg.silence_elapsed(t0 + millis(1_201)));
        assert_eq!(agg.deadline(), Some(t0 + millis(1_200)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthetic_sequences_around_threshold() {
        // Sweep offsets across the boundary; the law must flip exactly once.
        let threshold = millis(700);
        for offset_ms in [0u64, 100, 650, 699, 700, 701, 750, 1_400] {
            let mut agg = TranscriptAggregator::new(threshold);
            let t0 = Instant::now();
            agg.push_final("palabra", t0);

            let closes = agg.silence_elapsed(t0 + millis(offset_ms));
            assert_eq!(
                closes,
                offset_ms > 700,
                "offset {offset_ms}ms: expected closes={}",
                offset_ms > 700
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_text_refreshes_clock_without_buffering() {
        let mut agg = TranscriptAggregator::new(millis(700));
        let t0 = Instant::now();
        agg.push_final("hola buenas", t0);
        agg.push_final("   ", t0 + millis(600));

        // The blank fragment reset the clock but added no text.
        assert!(!agg.silence_elapsed(t0 + millis(1_200)));
        assert!(agg.silence_elapsed(t0 + millis(1_301)));
        assert_eq!(agg.take(), "hola buenas");
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_resets_state() {
        let mut agg = TranscriptAggregator::new(millis(700));
        let t0 = Instant::now();
        agg.push_final("hola", t0);
        let _ = agg.take();

        assert!(agg.is_empty());
        assert!(agg.deadline().is_none());
        assert!(!agg.silence_elapsed(t0 + millis(10_000)));
    }
}
