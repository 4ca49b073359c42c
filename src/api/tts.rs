//! Text-to-speech endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, ApiState};
use crate::audio::wav::pcm_to_wav;
use crate::domain::{DEFAULT_LANGUAGE, MAX_SPEED, MIN_SPEED, TtsRequest};

/// Longest accepted input text in characters
pub const MAX_TEXT_CHARS: usize = 10_000;

/// Build TTS router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/synthesize", post(synthesize))
        .route("/synthesize/stream", post(synthesize_stream))
        .route("/voices", get(voices))
        .route("/languages", get(languages))
        .with_state(state)
}

/// Synthesis request body
#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    pub text: String,
    #[serde(default)]
    pub voice_id: Option<Uuid>,
    #[serde(default = "default_language")]
    pub language: String,
    /// Falls back to the configured speed when absent
    #[serde(default)]
    pub speed: Option<f32>,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl SynthesizeRequest {
    /// Validate limits and convert into a domain request
    fn into_request(self, default_speed: f32) -> Result<TtsRequest, ApiError> {
        let chars = self.text.chars().count();
        if chars == 0 || chars > MAX_TEXT_CHARS {
            return Err(ApiError::BadRequest(format!(
                "text must be between 1 and {MAX_TEXT_CHARS} characters"
            )));
        }
        let speed = self.speed.unwrap_or(default_speed);
        if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            return Err(ApiError::BadRequest(format!(
                "speed must be between {MIN_SPEED} and {MAX_SPEED}"
            )));
        }

        Ok(TtsRequest {
            text: self.text,
            voice_id: self.voice_id,
            language: self.language,
            speed,
        })
    }
}

#[derive(Serialize)]
struct VoicesResponse {
    voices: Vec<String>,
}

#[derive(Serialize)]
struct LanguagesResponse {
    languages: Vec<String>,
}

/// Synthesize speech and return a WAV file
async fn synthesize(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<SynthesizeRequest>,
) -> Result<Response, ApiError> {
    let request = body.into_request(state.default_speed)?;
    let response = state.tts.synthesize(&request).await?;
    let wav = pcm_to_wav(&response.pcm, response.sample_rate, response.channels)?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::HeaderName::from_static("x-audio-duration"),
                response.duration_seconds.to_string(),
            ),
            (
                header::HeaderName::from_static("x-sample-rate"),
                response.sample_rate.to_string(),
            ),
        ],
        wav,
    )
        .into_response())
}

/// Synthesize speech and stream the WAV in chunks
async fn synthesize_stream(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<SynthesizeRequest>,
) -> Result<Response, ApiError> {
    let request = body.into_request(state.default_speed)?;
    let chunks = state.tts.synthesize_stream(&request).await?;
    let body = Body::from_stream(chunks.map(|chunk| chunk.map_err(std::io::Error::other)));

    Ok(([(header::CONTENT_TYPE, "audio/wav")], body).into_response())
}

/// List built-in voices
async fn voices(State(state): State<Arc<ApiState>>) -> Result<Json<VoicesResponse>, ApiError> {
    Ok(Json(VoicesResponse {
        voices: state.tts.available_voices().await?,
    }))
}

/// List supported languages
async fn languages(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<LanguagesResponse>, ApiError> {
    Ok(Json(LanguagesResponse {
        languages: state.tts.supported_languages().await?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str, speed: f32) -> SynthesizeRequest {
        SynthesizeRequest {
            text: text.to_string(),
            voice_id: None,
            language: default_language(),
            speed: Some(speed),
        }
    }

    #[test]
    fn defaults_apply_on_deserialize() {
        let body: SynthesizeRequest = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(body.language, "en");
        assert!(body.speed.is_none());
        assert!(body.voice_id.is_none());

        let req = body.into_request(1.25).unwrap();
        assert!((req.speed - 1.25).abs() < f32::EPSILON);
    }

    #[test]
    fn explicit_speed_wins_over_default() {
        let req = request("hi", 0.75).into_request(1.5).unwrap();
        assert!((req.speed - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn text_length_is_bounded() {
        assert!(request("", 1.0).into_request(1.0).is_err());
        assert!(request(&"a".repeat(MAX_TEXT_CHARS + 1), 1.0).into_request(1.0).is_err());
        assert!(request(&"a".repeat(MAX_TEXT_CHARS), 1.0).into_request(1.0).is_ok());
    }

    #[test]
    fn speed_is_bounded() {
        assert!(request("hi", 0.4).into_request(1.0).is_err());
        assert!(request("hi", 2.1).into_request(1.0).is_err());
        let req = request("hi", 0.5).into_request(1.0).unwrap();
        assert!((req.speed - 0.5).abs() < f32::EPSILON);
    }
}
