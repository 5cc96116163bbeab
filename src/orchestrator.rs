// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Per-session orchestration.
//!
//! One orchestrator runs per call, as a single select loop over three
//! sources: inbound transport events, transcript fragments from the
//! recognizer's reader task, and the end-of-turn silence timer. All session
//! state mutation happens on this path or in the single turn task it spawns,
//! so fragments are processed strictly in arrival order and turns execute
//! one at a time.
//!
//! Barge-in rides the fragment path: an interim fragment while the session
//! is speaking emits one `clear` to the outbound sink and releases the voice
//! channel; the running playback notices within a frame.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::aggregator::TranscriptAggregator;
use crate::events::{InboundEvent, OutboundEvent, StartEvent};
use crate::playback::FrameGeometry;
use crate::services::{
    RecognizerStream, Responder, SpeechRecognizer, Synthesizer, TicketSink, TranscriptFragment,
    Transcoder,
};
use crate::session::Session;
use crate::turn::{TurnExecutor, TurnInput};

/// The shared, stateless adapter set wired into every session.
pub struct Adapters {
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub responder: Arc<dyn Responder>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub transcoder: Arc<dyn Transcoder>,
    pub tickets: Arc<dyn TicketSink>,
}

impl Clone for Adapters {
    fn clone(&self) -> Self {
        Self {
            recognizer: Arc::clone(&self.recognizer),
            responder: Arc::clone(&self.responder),
            synthesizer: Arc::clone(&self.synthesizer),
            transcoder: Arc::clone(&self.transcoder),
            tickets: Arc::clone(&self.tickets),
        }
    }
}

/// Drives one call from start to stop.
pub struct SessionOrchestrator {
    session: Arc<Session>,
    recognizer: Arc<dyn SpeechRecognizer>,
    executor: TurnExecutor,
    aggregator: TranscriptAggregator,
    sink: mpsc::Sender<OutboundEvent>,
}

impl SessionOrchestrator {
    /// Wire up a new session around the shared adapters.
    pub fn new(
        adapters: Adapters,
        sink: mpsc::Sender<OutboundEvent>,
        silence_threshold: Duration,
        geometry: FrameGeometry,
    ) -> Self {
        let session = Session::new();
        let executor = TurnExecutor::new(
            Arc::clone(&session),
            adapters.responder,
            adapters.synthesizer,
            adapters.transcoder,
            adapters.tickets,
            sink.clone(),
            geometry,
        );
        Self {
            session,
            recognizer: adapters.recognizer,
            executor,
            aggregator: TranscriptAggregator::new(silence_threshold),
            sink,
        }
    }

    /// The session state container (exposed for tests and diagnostics).
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Process transport events until the stream stops or the transport
    /// disconnects.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<InboundEvent>) {
        // Held for the whole call so the fragment channel never closes
        // under the select loop.
        let (fragment_tx, mut fragment_rx) = mpsc::channel::<TranscriptFragment>(256);
        let mut recognizer_stream: Option<Box<dyn RecognizerStream>> = None;

        loop {
            // Arm the silence timer only when there is buffered text to
            // close and nobody is speaking. The extra millisecond makes the
            // strict `elapsed > threshold` law hold when the timer fires.
            let deadline = if self.session.is_speaking() {
                None
            } else {
                self.aggregator.deadline().map(|d| d + Duration::from_millis(1))
            };

            tokio::select! {
                event = inbound.recv() => match event {
                    None => {
                        tracing::debug!("transport channel closed");
                        break;
                    }
                    Some(InboundEvent::Start(start)) => {
                        self.handle_start(start, &mut recognizer_stream, fragment_tx.clone())
                            .await;
                    }
                    Some(InboundEvent::Media(media)) => {
                        if let Some(stream) = recognizer_stream.as_mut() {
                            if let Err(error) = stream.send_audio(&media.audio).await {
                                tracing::warn!(%error, "recognizer rejected audio; dropping stream");
                                recognizer_stream = None;
                            }
                        } else {
                            tracing::trace!("media before start/recognizer; dropped");
                        }
                    }
                    Some(InboundEvent::Stop) => {
                        tracing::info!("stream stopped");
                        if let Some(mut stream) = recognizer_stream.take() {
                            let _ = stream.finish().await;
                        }
                        break;
                    }
                },

                Some(fragment) = fragment_rx.recv() => {
                    self.handle_fragment(fragment);
                }

                _ = sleep_until_or_forever(deadline) => {
                    self.close_turn("silence threshold");
                }
            }
        }

        tracing::debug!("session orchestrator finished");
    }

    async fn handle_start(
        &mut self,
        start: StartEvent,
        recognizer_stream: &mut Option<Box<dyn RecognizerStream>>,
        fragment_tx: mpsc::Sender<TranscriptFragment>,
    ) {
        tracing::info!(stream_sid = %start.stream_sid, "stream started");

        let greet = self.session.with_core(|core| {
            core.stream_sid = Some(start.stream_sid.clone());
            core.caller_phone = start.caller.clone();
            if core.greeted {
                false
            } else {
                core.greeted = true;
                true
            }
        });

        match self.recognizer.open_stream(fragment_tx).await {
            Ok(stream) => *recognizer_stream = Some(stream),
            Err(error) => {
                // The call can still speak (greeting), it just won't hear.
                tracing::error!(%error, "recognizer stream failed to open");
            }
        }

        if greet {
            let executor = self.executor.clone();
            tokio::spawn(async move {
                executor.run(TurnInput::Greeting).await;
            });
        }
    }

    /// Route one transcript fragment: barge-in while speaking, aggregation
    /// otherwise.
    fn handle_fragment(&mut self, fragment: TranscriptFragment) {
        if self.session.is_speaking() {
            if !fragment.is_final {
                // Barge-in. cancel_speech wins once per turn, so exactly
                // one clear event goes out however many interims arrive.
                if self.session.cancel_speech() {
                    let stream_sid = self.session.stream_sid().unwrap_or_default();
                    if let Err(error) =
                        self.sink.try_send(OutboundEvent::Clear { stream_sid })
                    {
                        tracing::warn!(%error, "failed to emit clear event");
                    }
                    tracing::info!("barge-in: playback cancelled");
                }
            }
            // Speech during playback is not carried into the next turn.
            return;
        }

        if fragment.is_final {
            self.aggregator.push_final(&fragment.text, fragment.timestamp);
        }
        if fragment.is_end_of_speech {
            self.close_turn("end of speech");
        }
    }

    /// Declare end-of-turn: hand the aggregated utterance to a turn task.
    fn close_turn(&mut self, trigger: &str) {
        let utterance = self.aggregator.take();
        if utterance.is_empty() {
            tracing::debug!(trigger, "end of turn with empty buffer; nothing to do");
            return;
        }

        tracing::info!(trigger, utterance = %utterance, "end of turn");
        let executor = self.executor.clone();
        tokio::spawn(async move {
            executor.run(TurnInput::Utterance(utterance)).await;
        });
    }
}

/// Sleep until the deadline, or forever when there is none.
async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
