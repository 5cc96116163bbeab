// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! The dialogue script: a parameterized linear stage pipeline.
//!
//! Every stage is described by the same shape — a prompt, an optional
//! validator, an optional normalizer — and [`plan_turn`] runs the current
//! stage's entry against the caller's utterance. Planning is pure: it reads
//! a snapshot and returns the reply to speak plus the state changes to
//! commit, which the turn executor applies only after the reply audio is
//! actually ready (a failed adapter call must leave the stage retryable).

use crate::session::normalize::{display_token, is_goodbye, is_vague_reason, normalize_name};
use crate::session::Stage;

// ---------------------------------------------------------------------------
// Script text
// ---------------------------------------------------------------------------

/// Spoken once when the stream starts; doubles as the IDENTIFY prompt.
pub const GREETING: &str = "Hola, le atiende el asistente de soporte. \
¿Con quién tengo el gusto de hablar?";

/// REASON stage prompt, spoken after acknowledging the caller's name.
const REASON_PROMPT: &str = "¿En qué puedo ayudarle? Cuénteme el motivo de su llamada.";

/// Spoken when the REASON input is too vague to store.
const REASON_REPROMPT: &str = "Perdone, no le he entendido bien. ¿Podría \
contarme con un poco más de detalle el motivo de su llamada?";

/// The single DONE-stage farewell.
const FAREWELL: &str = "Gracias por su llamada. Que tenga un buen día. ¡Hasta luego!";

// ---------------------------------------------------------------------------
// Stage table
// ---------------------------------------------------------------------------

/// One stage's parameterization.
pub struct StageSpec {
    /// What the bot asks when this stage becomes active.
    pub prompt: &'static str,
    /// Accepts or rejects the caller's input; `None` accepts everything.
    pub validator: Option<fn(&str) -> bool>,
    /// Cleans the input before it is stored; `None` stores it verbatim.
    pub normalizer: Option<fn(&str) -> String>,
}

/// The linear script, one entry per stage.
pub fn spec_for(stage: Stage) -> &'static StageSpec {
    const IDENTIFY: StageSpec = StageSpec {
        prompt: GREETING,
        validator: None,
        normalizer: Some(|raw| normalize_name(raw)),
    };
    const REASON: StageSpec = StageSpec {
        prompt: REASON_PROMPT,
        validator: Some(|utterance| !is_vague_reason(utterance)),
        normalizer: None,
    };
    const DONE: StageSpec = StageSpec {
        prompt: "",
        validator: None,
        normalizer: None,
    };

    match stage {
        Stage::Identify => &IDENTIFY,
        Stage::Reason => &REASON,
        Stage::Done => &DONE,
    }
}

// ---------------------------------------------------------------------------
// Turn planning
// ---------------------------------------------------------------------------

/// What the turn should say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Fixed script text; no responder call.
    Script(String),
    /// The REASON closing: the responder phrases the reply, and the ticket
    /// pipeline runs.
    Closing { reason: String },
}

/// State changes to apply once the reply audio is ready.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Commit {
    pub next_stage: Option<Stage>,
    pub caller_identity: Option<String>,
    pub captured_reason: Option<String>,
    pub mark_farewell: bool,
    /// Whether this turn qualifies for ticket submission (still subject to
    /// the session's idempotency guard at commit time).
    pub file_ticket: bool,
}

/// The outcome of planning one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Speak a reply and commit the attached state changes.
    Advance { reply: Reply, commit: Commit },
    /// Explicit no-op: nothing is spoken, no adapters run.
    Silent,
}

/// Run the current stage's script entry against one utterance.
pub fn plan_turn(stage: Stage, farewell_said: bool, input: &str) -> Plan {
    let spec = spec_for(stage);

    match stage {
        Stage::Identify => {
            let name = match spec.normalizer {
                Some(normalize) => normalize(input),
                None => input.trim().to_string(),
            };
            if name.is_empty() {
                // The utterance was all filler; ask again.
                return Plan::Advance {
                    reply: Reply::Script(spec.prompt.to_string()),
                    commit: Commit::default(),
                };
            }

            let ack = match display_token(&name) {
                Some(token) => format!("Gracias, {token}. {REASON_PROMPT}"),
                None => REASON_PROMPT.to_string(),
            };
            Plan::Advance {
                reply: Reply::Script(ack),
                commit: Commit {
                    next_stage: Some(Stage::Reason),
                    caller_identity: Some(name),
                    ..Commit::default()
                },
            }
        }

        Stage::Reason => {
            let accepted = spec.validator.map(|validate| validate(input)).unwrap_or(true);
            if !accepted {
                return Plan::Advance {
                    reply: Reply::Script(REASON_REPROMPT.to_string()),
                    commit: Commit::default(),
                };
            }

            let reason = input.trim().to_string();
            Plan::Advance {
                reply: Reply::Closing { reason: reason.clone() },
                commit: Commit {
                    next_stage: Some(Stage::Done),
                    captured_reason: Some(reason),
                    file_ticket: true,
                    ..Commit::default()
                },
            }
        }

        Stage::Done => {
            if is_goodbye(input) && !farewell_said {
                Plan::Advance {
                    reply: Reply::Script(FAREWELL.to_string()),
                    commit: Commit {
                        mark_farewell: true,
                        ..Commit::default()
                    },
                }
            } else {
                Plan::Silent
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
