//! HTTP and WebSocket API for the TTS server

pub mod audio;
pub mod capture;
mod error;
pub mod health;
pub mod synth_play;
pub mod tts;
pub mod voices;

pub use error::{ApiError, ErrorResponse};

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::ports::AudioStreamPort;
use crate::services::{
    AudioPlaybackService, CloneSpeechService, SynthPlayService, TextToSpeechService,
};

/// Largest accepted request body (voice samples are uploaded whole)
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub tts: Arc<TextToSpeechService>,
    pub voices: Arc<CloneSpeechService>,
    pub playback: Arc<AudioPlaybackService>,
    pub synth_play: Arc<SynthPlayService>,
    pub capture: Arc<dyn AudioStreamPort>,
    /// Queue capacity for capture clients that don't ask for one
    pub capture_max_frames: usize,
    /// Speed multiplier for synthesis requests that don't set one
    pub default_speed: f32,
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/tts", tts::router(Arc::clone(&state)))
        .nest("/voices", voices::router(Arc::clone(&state)))
        .nest("/audio", audio::router(Arc::clone(&state)))
        .nest("/ws", capture::router(Arc::clone(&state)))
        .nest("/ws", synth_play::router(state))
        .merge(health::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    addr: String,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: ApiState, addr: impl Into<String>) -> Self {
        Self {
            state: Arc::new(state),
            addr: addr.into(),
        }
    }

    /// Run the API server until Ctrl+C
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(addr = %self.addr, "API server listening");

        let capture = Arc::clone(&self.state.capture);
        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("received shutdown signal");
                }
            })
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        // Release the input device and wake any capture clients
        capture.stop();
        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
