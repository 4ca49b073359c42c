//! WebSocket synthesize-and-play
//!
//! The client sends one JSON request; the server streams every state
//! transition of the call and closes the socket once it has finished.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::ApiState;
use super::tts::MAX_TEXT_CHARS;
use crate::domain::{DEFAULT_LANGUAGE, StateChange, SynthPlayState};

/// Build synth-play WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/synth-play", get(synth_play_ws))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SynthPlayRequest {
    pub text: String,
    #[serde(default)]
    pub voice_id: Option<Uuid>,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// Outgoing state message
#[derive(Debug, Serialize)]
pub struct SynthPlayMessage {
    pub state: SynthPlayState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SynthPlayMessage {
    fn error(error: impl Into<String>) -> Self {
        Self {
            state: SynthPlayState::Error,
            message: None,
            duration_seconds: None,
            error: Some(error.into()),
        }
    }
}

impl From<StateChange> for SynthPlayMessage {
    fn from(change: StateChange) -> Self {
        match change.state {
            SynthPlayState::Error => Self::error(change.message.unwrap_or_default()),
            state => Self {
                state,
                message: change.message,
                duration_seconds: change.duration_seconds,
                error: None,
            },
        }
    }
}

async fn synth_play_ws(ws: WebSocketUpgrade, State(state): State<Arc<ApiState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<ApiState>) {
    tracing::info!("synth-play client connected");

    let request = match read_request(&mut socket).await {
        Ok(Some(request)) => request,
        Ok(None) => return,
        Err(msg) => {
            send_json(&mut socket, &SynthPlayMessage::error(msg)).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let voice = match state.tts.resolve_voice(request.voice_id).await {
        Ok(voice) => voice,
        Err(e) => {
            send_json(&mut socket, &SynthPlayMessage::error(e.to_string())).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::channel::<StateChange>(8);
    let forward = tokio::spawn(async move {
        while let Some(change) = rx.recv().await {
            send_json(&mut socket, &SynthPlayMessage::from(change)).await;
        }
        socket
    });

    let result = state
        .synth_play
        .synthesize_and_play(&request.text, &request.language, voice.as_ref(), Some(&tx))
        .await;
    drop(tx);

    match forward.await {
        Ok(mut socket) => {
            let _ = socket.send(Message::Close(None)).await;
        }
        Err(e) => tracing::warn!(error = %e, "synth-play forwarder failed"),
    }

    match result {
        Ok(status) => tracing::info!(duration = ?status.duration_seconds, "synth-play finished"),
        Err(e) => tracing::info!(error = %e, "synth-play ended with error"),
    }
}

/// Wait for the request message; `Ok(None)` when the client left first
async fn read_request(socket: &mut WebSocket) -> Result<Option<SynthPlayRequest>, String> {
    while let Some(msg) = socket.recv().await {
        match msg {
            Ok(Message::Text(text)) => return parse_request(text.as_str()).map(Some),
            Ok(Message::Binary(_)) => return Err("expected a JSON text message".to_string()),
            Ok(Message::Close(_)) | Err(_) => return Ok(None),
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
        }
    }
    Ok(None)
}

fn parse_request(text: &str) -> Result<SynthPlayRequest, String> {
    let request: SynthPlayRequest =
        serde_json::from_str(text).map_err(|e| format!("invalid request: {e}"))?;
    if request.text.chars().count() > MAX_TEXT_CHARS {
        return Err(format!("text must be at most {MAX_TEXT_CHARS} characters"));
    }
    Ok(request)
}

async fn send_json(socket: &mut WebSocket, msg: &SynthPlayMessage) {
    match serde_json::to_string(msg) {
        Ok(text) => {
            if socket.send(Message::Text(text.into())).await.is_err() {
                tracing::debug!("synth-play client gone");
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to encode synth-play message"),
    }
}
