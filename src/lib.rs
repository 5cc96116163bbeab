// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Centralita - real-time voice helpdesk gateway.
//!
//! Runs one bidirectional voice session per telephone-style call: inbound
//! audio streams to a speech recognizer, aggregated transcripts drive a
//! linear dialogue (identify the caller, capture the reason, file a ticket),
//! replies are generated, synthesized, transcoded to the call's wire codec
//! and played back paced in real time - interruptible the moment the caller
//! starts speaking again.

pub mod aggregator;
pub mod config;
pub mod events;
pub mod orchestrator;
pub mod playback;
pub mod services;
pub mod session;
pub mod ticket;
pub mod turn;
pub mod util;
