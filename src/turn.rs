// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Turn execution: one caller utterance in, at most one spoken reply out.
//!
//! The executor claims the session's voice channel (`speaking=true`) for the
//! whole run; the claim is an RAII guard, so the channel is released on every
//! exit path. The body is the only place that performs suspending adapter
//! calls:
//!
//! 1. plan the turn against the stage script (pure, under the state lock)
//! 2. obtain reply text — fixed script text, or the responder for the
//!    REASON closing
//! 3. synthesize, then transcode to the wire codec
//! 4. commit the stage transition and run the ticket pipeline
//! 5. hand the audio to the playback scheduler
//!
//! Commits happen only after the reply audio is ready: an adapter failure
//! before that point leaves `stage` untouched so the caller's next utterance
//! retries the same stage.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::OutboundEvent;
use crate::playback::{self, FrameGeometry};
use crate::services::openai::{parse_classification, Classification};
use crate::services::{AdapterError, Responder, ResponderContext, Synthesizer, TicketSink, Transcoder};
use crate::session::script::{self, Commit, Plan, Reply};
use crate::session::{Session, TurnGuard};
use crate::ticket::Ticket;

/// What triggers a turn.
#[derive(Debug, Clone)]
pub enum TurnInput {
    /// The one-time session greeting (no caller utterance).
    Greeting,
    /// An aggregated caller utterance.
    Utterance(String),
}

/// One turn's ephemeral record; never outlives the executor run.
#[derive(Debug)]
struct Turn {
    generation: u64,
    input_text: String,
    reply_text: String,
    outbound_audio: Vec<u8>,
}

/// Executes turns for one session.
///
/// Cheap to clone: adapters are shared handles.
pub struct TurnExecutor {
    session: Arc<Session>,
    responder: Arc<dyn Responder>,
    synthesizer: Arc<dyn Synthesizer>,
    transcoder: Arc<dyn Transcoder>,
    tickets: Arc<dyn TicketSink>,
    sink: mpsc::Sender<OutboundEvent>,
    geometry: FrameGeometry,
}

impl Clone for TurnExecutor {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            responder: Arc::clone(&self.responder),
            synthesizer: Arc::clone(&self.synthesizer),
            transcoder: Arc::clone(&self.transcoder),
            tickets: Arc::clone(&self.tickets),
            sink: self.sink.clone(),
            geometry: self.geometry,
        }
    }
}

impl TurnExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Arc<Session>,
        responder: Arc<dyn Responder>,
        synthesizer: Arc<dyn Synthesizer>,
        transcoder: Arc<dyn Transcoder>,
        tickets: Arc<dyn TicketSink>,
        sink: mpsc::Sender<OutboundEvent>,
        geometry: FrameGeometry,
    ) -> Self {
        Self {
            session,
            responder,
            synthesizer,
            transcoder,
            tickets,
            sink,
            geometry,
        }
    }

    /// Run one turn to completion.
    ///
    /// Adapter failures are absorbed here: logged, turn dropped, session
    /// left ready for the next utterance.
    pub async fn run(&self, input: TurnInput) {
        let Some(guard) = self.session.begin_turn() else {
            // A turn is already speaking; the orchestrator suppresses
            // end-of-turn while speaking, so this only races a just-started
            // turn. Dropping the input is the single-turn guarantee.
            tracing::debug!("turn refused: session already speaking");
            return;
        };

        if let Err(error) = self.execute(&guard, input).await {
            tracing::warn!(%error, "turn aborted; stage unchanged, ready for retry");
        }
        // `guard` drops here: speaking is cleared on every exit path.
    }

    async fn execute(&self, guard: &TurnGuard, input: TurnInput) -> Result<(), AdapterError> {
        // Plan under the lock: read a consistent snapshot, no awaits.
        let (plan, context) = self.session.with_core(|core| {
            let plan = match &input {
                TurnInput::Greeting => Plan::Advance {
                    reply: Reply::Script(script::GREETING.to_string()),
                    commit: Commit::default(),
                },
                TurnInput::Utterance(text) => {
                    script::plan_turn(core.stage, core.farewell_said, text)
                }
            };
            let context = ResponderContext {
                caller_identity: core.caller_identity.clone(),
                captured_reason: core.captured_reason.clone(),
            };
            (plan, context)
        });

        let (reply, commit) = match plan {
            Plan::Silent => {
                tracing::debug!("turn is a scripted no-op");
                return Ok(());
            }
            Plan::Advance { reply, commit } => (reply, commit),
        };

        let input_text = match &input {
            TurnInput::Greeting => String::new(),
            TurnInput::Utterance(text) => text.clone(),
        };

        // Reply text: scripted, or phrased by the responder for the closing.
        let (reply_text, closing_reason) = match reply {
            Reply::Script(text) => (text, None),
            Reply::Closing { reason } => {
                let text = self.responder.reply(&reason, &context).await?;
                (text, Some(reason))
            }
        };

        // Audio pipeline: synthesize, then transcode to the wire codec.
        let synthesized = self.synthesizer.synthesize(&reply_text).await?;
        let outbound_audio = self.transcoder.transcode(&synthesized).await?;

        let turn = Turn {
            generation: guard.generation(),
            input_text,
            reply_text,
            outbound_audio,
        };

        // The reply audio exists; commit the stage transition and claim the
        // ticket guard atomically with it.
        let (stream_sid, ticket_claim) = self.session.with_core(|core| {
            if let Some(stage) = commit.next_stage {
                core.stage = stage;
            }
            if let Some(identity) = &commit.caller_identity {
                core.caller_identity = Some(identity.clone());
            }
            if let Some(reason) = &commit.captured_reason {
                core.captured_reason = Some(reason.clone());
            }
            if commit.mark_farewell {
                core.farewell_said = true;
            }

            let claim = if commit.file_ticket && !core.ticket_submitted {
                core.ticket_submitted = true;
                Some((
                    core.caller_identity.clone().unwrap_or_else(|| "desconocido".to_string()),
                    core.caller_phone.clone().unwrap_or_else(|| "desconocido".to_string()),
                ))
            } else {
                None
            };

            (core.stream_sid.clone().unwrap_or_default(), claim)
        });

        if let Some((name, phone)) = ticket_claim {
            let reason = closing_reason.as_deref().unwrap_or("");
            self.file_ticket(reason, name, phone, &context).await;
        }

        tracing::debug!(
            generation = turn.generation,
            input = %turn.input_text,
            reply = %turn.reply_text,
            audio_bytes = turn.outbound_audio.len(),
            "turn ready for playback"
        );

        let outcome = playback::play(
            &turn.outbound_audio,
            &self.sink,
            &self.session,
            turn.generation,
            &stream_sid,
            self.geometry,
        )
        .await;

        tracing::debug!(
            frames = outcome.frames_sent,
            completed = outcome.completed,
            "playback finished"
        );
        Ok(())
    }

    /// Classify the reason and submit the ticket. Never fails the turn:
    /// classification errors fall back to defaults, sink errors are logged
    /// and not retried (the idempotency guard is already claimed).
    async fn file_ticket(
        &self,
        reason: &str,
        name: String,
        phone: String,
        context: &ResponderContext,
    ) {
        let classification = match self.responder.classify(reason, context).await {
            Ok(raw) => parse_classification(&raw),
            Err(error) => {
                tracing::warn!(%error, "classification failed, using defaults");
                Classification::default()
            }
        };

        let ticket = Ticket {
            name,
            phone,
            category: classification.category,
            urgency: classification.urgency,
            reason_text: reason.to_string(),
        };

        if let Err(error) = self.tickets.submit(&ticket).await {
            // At-most-once by design: the guard stays set, the loss is loud.
            tracing::error!(%error, "ticket submission failed; not retried");
        }
    }
}
