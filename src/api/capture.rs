//! WebSocket microphone stream
//!
//! Each connection is one hub subscriber. The first message is a JSON text
//! frame describing the stream format; every following message is a binary
//! frame laid out as
//!
//! ```text
//! [u64 LE sequence][interleaved samples, LE]
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::ApiState;
use crate::domain::{AudioFrame, SampleFormat, StreamFormat};
use crate::ports::FrameReader;

/// How long the pump waits for a frame before re-checking the connection
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Frames buffered between the blocking pump and the socket writer
const FORWARD_BUFFER: usize = 32;

/// Build capture WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/capture", get(capture_ws))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CaptureParams {
    pub name: Option<String>,
    pub max_frames: Option<usize>,
}

/// Stream header sent before any audio
#[derive(Debug, Serialize)]
struct FormatMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    sample_rate: u32,
    channels: u16,
    block_size: u32,
    sample_format: SampleFormat,
}

impl From<StreamFormat> for FormatMessage {
    fn from(f: StreamFormat) -> Self {
        Self {
            kind: "format",
            sample_rate: f.sample_rate,
            channels: f.channels,
            block_size: f.block_size,
            sample_format: f.sample_format,
        }
    }
}

async fn capture_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
    Query(params): Query<CaptureParams>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

async fn handle_socket(socket: WebSocket, state: Arc<ApiState>, params: CaptureParams) {
    let name = params.name.unwrap_or_else(|| "websocket".to_string());
    let max_frames = params
        .max_frames
        .filter(|&n| n > 0)
        .unwrap_or(state.capture_max_frames);

    let reader: Arc<dyn FrameReader> = Arc::from(state.capture.subscribe(&name, max_frames));
    tracing::info!(name = %name, max_frames, "capture client connected");

    let (mut sender, mut receiver) = socket.split();

    let header = FormatMessage::from(state.capture.format());
    let Ok(text) = serde_json::to_string(&header) else {
        reader.close();
        return;
    };
    if sender.send(Message::Text(text.into())).await.is_err() {
        reader.close();
        return;
    }

    // Reader blocks on a condvar, so it is drained off the async runtime
    let (tx, mut rx) = mpsc::channel::<Arc<AudioFrame>>(FORWARD_BUFFER);
    let pump_reader = Arc::clone(&reader);
    let pump = tokio::task::spawn_blocking(move || {
        while !pump_reader.is_closed() && !tx.is_closed() {
            if let Some(frame) = pump_reader.read(Some(READ_TIMEOUT))
                && tx.blocking_send(frame).is_err()
            {
                break;
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender
                .send(Message::Binary(encode_frame(&frame).into()))
                .await
                .is_err()
            {
                return;
            }
        }
        // Subscription closed by the hub
        let _ = sender.send(Message::Close(None)).await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    reader.close();
    if let Err(e) = pump.await {
        tracing::warn!(error = %e, "capture pump failed");
    }
    tracing::info!(name = %name, dropped = reader.dropped(), "capture client disconnected");
}

/// Encode one frame as sequence number followed by its samples
#[must_use]
pub fn encode_frame(frame: &AudioFrame) -> Vec<u8> {
    let samples = frame.samples.to_le_bytes();
    let mut out = Vec::with_capacity(8 + samples.len());
    out.extend_from_slice(&frame.sequence.to_le_bytes());
    out.extend_from_slice(&samples);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FrameSamples;

    #[test]
    fn frame_layout_is_sequence_then_samples() {
        let frame = AudioFrame {
            samples: FrameSamples::F32(Arc::from(vec![1.0f32, -1.0])),
            format: StreamFormat::default(),
            sequence: 7,
        };
        let bytes = encode_frame(&frame);

        assert_eq!(bytes.len(), 8 + 2 * 4);
        assert_eq!(u64::from_le_bytes(bytes[..8].try_into().unwrap()), 7);
        assert_eq!(bytes[8..12], 1.0f32.to_le_bytes());
        assert_eq!(bytes[12..16], (-1.0f32).to_le_bytes());
    }

    #[test]
    fn header_names_format() {
        let json = serde_json::to_value(FormatMessage::from(StreamFormat::default())).unwrap();
        assert_eq!(json["type"], "format");
        assert_eq!(json["sample_rate"], 16_000);
        assert_eq!(json["sample_format"], "f32");
    }
}
