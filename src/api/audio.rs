//! Host playback and capture control endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState};
use crate::domain::{PlaybackStatus, StreamFormat};

/// Build audio router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/play-bytes", post(play_bytes))
        .route("/play-file", post(play_file))
        .route("/stop", post(stop))
        .route("/status", get(status))
        .route("/capture/start", post(capture_start))
        .route("/capture/stop", post(capture_stop))
        .route("/capture/status", get(capture_status))
        .with_state(state)
}

/// Raw PCM playback request
#[derive(Debug, Deserialize)]
pub struct PlayBytesRequest {
    /// Base64-encoded 16-bit little-endian PCM
    pub audio_data: String,
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
}

const fn default_channels() -> u16 {
    1
}

#[derive(Debug, Deserialize)]
pub struct PlayFileRequest {
    pub file_path: String,
}

/// Capture hub state
#[derive(Debug, Serialize)]
pub struct CaptureStatus {
    pub running: bool,
    pub subscribers: usize,
    pub format: StreamFormat,
}

/// Play raw PCM on the host; resolves after playback
async fn play_bytes(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<PlayBytesRequest>,
) -> Result<Json<PlaybackStatus>, ApiError> {
    let pcm = BASE64
        .decode(body.audio_data.as_bytes())
        .map_err(|e| ApiError::BadRequest(format!("audio_data is not valid base64: {e}")))?;

    let status = state
        .playback
        .play(pcm, body.sample_rate, body.channels)
        .await?;
    Ok(Json(status))
}

/// Play a WAV file on the host; resolves after playback
async fn play_file(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<PlayFileRequest>,
) -> Result<Json<PlaybackStatus>, ApiError> {
    let status = state.playback.play_file(&body.file_path).await?;
    Ok(Json(status))
}

async fn stop(State(state): State<Arc<ApiState>>) -> Json<PlaybackStatus> {
    state.playback.stop().await;
    Json(PlaybackStatus::idle())
}

async fn status(State(state): State<Arc<ApiState>>) -> Json<PlaybackStatus> {
    Json(PlaybackStatus {
        is_playing: state.playback.is_playing(),
        duration_seconds: None,
    })
}

fn capture_status_of(state: &ApiState) -> CaptureStatus {
    CaptureStatus {
        running: state.capture.is_running(),
        subscribers: state.capture.subscriber_count(),
        format: state.capture.format(),
    }
}

/// Open the input stream
async fn capture_start(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<CaptureStatus>, ApiError> {
    let capture = Arc::clone(&state.capture);
    tokio::task::spawn_blocking(move || capture.start())
        .await
        .map_err(|e| ApiError::Service(crate::Error::Device(format!("capture start panicked: {e}"))))??;

    tracing::info!("capture started");
    Ok(Json(capture_status_of(&state)))
}

/// Close every subscriber and release the input stream
async fn capture_stop(State(state): State<Arc<ApiState>>) -> Json<CaptureStatus> {
    let capture = Arc::clone(&state.capture);
    if let Err(e) = tokio::task::spawn_blocking(move || capture.stop()).await {
        tracing::warn!(error = %e, "capture stop task failed");
    }

    tracing::info!("capture stopped");
    Json(capture_status_of(&state))
}

async fn capture_status(State(state): State<Arc<ApiState>>) -> Json<CaptureStatus> {
    Json(capture_status_of(&state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_default_to_mono() {
        let body: PlayBytesRequest =
            serde_json::from_str(r#"{"audio_data":"AAA=","sample_rate":22050}"#).unwrap();
        assert_eq!(body.channels, 1);
        assert_eq!(BASE64.decode(body.audio_data).unwrap(), vec![0, 0]);
    }
}
