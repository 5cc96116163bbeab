// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Per-call session state.
//!
//! One [`Session`] exists per media stream. The dialogue state lives behind
//! a mutex that is only ever locked for short synchronous sections (never
//! across an await); the two flags that other tasks race on — `speaking`
//! and the turn generation — are atomics.
//!
//! Invariants:
//! - `speaking` is true for the entire duration of exactly one active turn
//!   and false otherwise. [`Session::begin_turn`] hands out an RAII
//!   [`TurnGuard`] whose `Drop` clears the flag on every exit path.
//! - `stage` only moves forward along IDENTIFY → REASON → DONE.
//! - `ticket_submitted` flips false→true at most once per session.

pub mod normalize;
pub mod script;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A step in the linear dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Asking who is calling.
    Identify,
    /// Asking why they are calling.
    Reason,
    /// Terminal: reason captured, ticket filed.
    Done,
}

/// Mutable dialogue state, guarded by the session mutex.
#[derive(Debug)]
pub struct DialogueCore {
    /// Stream identifier; unknown until the transport start event.
    pub stream_sid: Option<String>,
    /// Caller phone number from transport metadata, when available.
    pub caller_phone: Option<String>,
    /// Current dialogue stage.
    pub stage: Stage,
    /// Whether the one-time greeting has been spoken.
    pub greeted: bool,
    /// Normalized caller name, once captured.
    pub caller_identity: Option<String>,
    /// Accepted reason for the call, once captured.
    pub captured_reason: Option<String>,
    /// Idempotency guard for the ticket sink.
    pub ticket_submitted: bool,
    /// Whether the single DONE-stage farewell has been spoken.
    pub farewell_said: bool,
}

impl DialogueCore {
    fn new() -> Self {
        Self {
            stream_sid: None,
            caller_phone: None,
            stage: Stage::Identify,
            greeted: false,
            caller_identity: None,
            captured_reason: None,
            ticket_submitted: false,
            farewell_said: false,
        }
    }
}

/// Per-call state container shared between the orchestrator loop, the turn
/// task it spawns, and the playback scheduler.
#[derive(Debug)]
pub struct Session {
    speaking: AtomicBool,
    generation: AtomicU64,
    core: Mutex<DialogueCore>,
}

impl Session {
    /// Create the state for a new call.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            speaking: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            core: Mutex::new(DialogueCore::new()),
        })
    }

    /// Whether a turn currently owns the voice channel.
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }

    /// The current turn generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Claim the voice channel for a new turn.
    ///
    /// Returns `None` if a turn is already active — the mutual-exclusion
    /// guarantee. On success the generation is bumped, invalidating any
    /// still-draining playback from a superseded turn.
    pub fn begin_turn(self: &Arc<Self>) -> Option<TurnGuard> {
        if self
            .speaking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        Some(TurnGuard {
            session: Arc::clone(self),
            generation,
        })
    }

    /// Barge-in: release the voice channel out from under the active turn.
    ///
    /// Returns true if playback was actually active (exactly one caller wins
    /// per turn, so one `clear` event is emitted per barge-in).
    pub fn cancel_speech(&self) -> bool {
        self.speaking.swap(false, Ordering::AcqRel)
    }

    /// Run a short synchronous section against the dialogue state.
    ///
    /// The closure must not block; the lock is never held across an await.
    pub fn with_core<R>(&self, f: impl FnOnce(&mut DialogueCore) -> R) -> R {
        let mut core = self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut core)
    }

    /// The stream identifier, once known.
    pub fn stream_sid(&self) -> Option<String> {
        self.with_core(|core| core.stream_sid.clone())
    }
}

/// RAII ownership of `speaking=true` for one turn.
///
/// Dropping the guard clears the flag, so every exit path — success, adapter
/// failure, panic, cancellation — releases the voice channel.
#[derive(Debug)]
pub struct TurnGuard {
    session: Arc<Session>,
    generation: u64,
}

impl TurnGuard {
    /// The generation this turn owns; playback checks it between frames.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.session.speaking.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
