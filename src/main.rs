// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Centralita server binary.
//!
//! Serves the telephony media-stream WebSocket at `/ws-media` and a health
//! probe at `/healthz`. Each WebSocket connection becomes one session: a
//! reader task parses inbound events, a writer task serializes outbound
//! events, and the session orchestrator runs the call in between.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMsg, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::Instrument;

use centralita::config::Settings;
use centralita::events::{parse_inbound, InboundEvent, OutboundEvent};
use centralita::orchestrator::{Adapters, SessionOrchestrator};
use centralita::playback::FrameGeometry;
use centralita::services::deepgram::DeepgramRecognizer;
use centralita::services::elevenlabs::ElevenLabsSynthesizer;
use centralita::services::ffmpeg::FfmpegTranscoder;
use centralita::services::openai::OpenAIResponder;
use centralita::services::TicketSink;
use centralita::ticket::{HttpTicketSink, LoggingTicketSink};
use centralita::util::generate_unique_id;

// ---------------------------------------------------------------------------
// Application state shared across handlers
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    adapters: Adapters,
    geometry: FrameGeometry,
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

/// GET /healthz - liveness probe.
async fn handle_healthz() -> impl IntoResponse {
    "ok"
}

/// GET /ws-media - the carrier connects here for audio streaming.
async fn handle_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

// ---------------------------------------------------------------------------
// WebSocket connection handler (one call)
// ---------------------------------------------------------------------------

async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let call_id = generate_unique_id("call");
    tracing::info!(call = %call_id, "carrier WebSocket connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundEvent>(1024);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundEvent>(1024);

    let orchestrator = SessionOrchestrator::new(
        state.adapters.clone(),
        outbound_tx,
        state.settings.silence_threshold,
        state.geometry,
    );
    let session_handle = tokio::spawn(
        orchestrator
            .run(inbound_rx)
            .instrument(tracing::info_span!("session", call = %call_id)),
    );

    // Writer: outbound events -> wire JSON.
    let write_handle = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let msg = WsMsg::Text(event.to_json().into());
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Reader: wire JSON -> inbound events, on this task.
    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            WsMsg::Text(text) => {
                if let Some(event) = parse_inbound(&text) {
                    let is_stop = matches!(event, InboundEvent::Stop);
                    if inbound_tx.send(event).await.is_err() {
                        break;
                    }
                    if is_stop {
                        break;
                    }
                }
            }
            WsMsg::Close(_) => {
                tracing::info!("carrier WebSocket closed");
                break;
            }
            _ => {}
        }
    }

    // Dropping the inbound sender ends the orchestrator loop.
    drop(inbound_tx);
    let _ = session_handle.await;
    write_handle.abort();
    tracing::info!("call session ended");
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,centralita=debug".parse().expect("static filter")),
        )
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => Arc::new(settings),
        Err(error) => {
            eprintln!("configuration error: {error}");
            std::process::exit(1);
        }
    };

    let tickets: Arc<dyn TicketSink> = match &settings.ticket_webhook_url {
        Some(url) => Arc::new(HttpTicketSink::new(url.clone())),
        None => {
            tracing::warn!("TICKET_WEBHOOK_URL not set; tickets will only be logged");
            Arc::new(LoggingTicketSink)
        }
    };

    let adapters = Adapters {
        recognizer: Arc::new(
            DeepgramRecognizer::new(settings.deepgram_api_key.clone())
                .with_model(settings.deepgram_model.clone()),
        ),
        responder: Arc::new(OpenAIResponder::new(
            settings.openai_api_key.clone(),
            settings.openai_model.clone(),
        )),
        synthesizer: Arc::new(
            ElevenLabsSynthesizer::new(
                settings.elevenlabs_api_key.clone(),
                settings.elevenlabs_voice_id.clone(),
            )
            .with_model(settings.elevenlabs_model.clone()),
        ),
        transcoder: Arc::new(FfmpegTranscoder::new(settings.ffmpeg_bin.clone())),
        tickets,
    };

    let geometry = FrameGeometry {
        frame_duration: settings.frame_duration,
        ..FrameGeometry::TELEPHONY
    };

    let state = AppState {
        settings: Arc::clone(&settings),
        adapters,
        geometry,
    };

    let app = Router::new()
        .route("/healthz", get(handle_healthz))
        .route("/ws-media", get(handle_ws))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(%addr, "centralita server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listen port");
    axum::serve(listener, app).await.expect("server error");
}
