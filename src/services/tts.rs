//! Text-to-speech service

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{TtsRequest, TtsResponse, VoiceModel};
use crate::ports::{AudioChunkStream, TtsEngine, VoiceRepository};
use crate::{Error, Result};

/// Resolves stored voices and delegates synthesis to the engine
pub struct TextToSpeechService {
    tts: Arc<dyn TtsEngine>,
    voices: Arc<dyn VoiceRepository>,
}

impl TextToSpeechService {
    #[must_use]
    pub fn new(tts: Arc<dyn TtsEngine>, voices: Arc<dyn VoiceRepository>) -> Self {
        Self { tts, voices }
    }

    /// Look up the voice referenced by a request
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the id names no stored voice
    pub async fn resolve_voice(&self, voice_id: Option<Uuid>) -> Result<Option<VoiceModel>> {
        let Some(id) = voice_id else {
            return Ok(None);
        };
        self.voices
            .get(id)
            .await?
            .map(Some)
            .ok_or_else(|| Error::NotFound(format!("voice {id} not found")))
    }

    /// Synthesize a full utterance
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown voice or the engine's error
    pub async fn synthesize(&self, request: &TtsRequest) -> Result<TtsResponse> {
        let voice = self.resolve_voice(request.voice_id).await?;
        let response = self.tts.synthesize(request, voice.as_ref()).await?;
        tracing::info!(
            chars = request.text.chars().count(),
            language = %request.language,
            duration = response.duration_seconds,
            "synthesized speech"
        );
        Ok(response)
    }

    /// Synthesize as a stream of WAV chunks
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown voice or the engine's error
    pub async fn synthesize_stream(&self, request: &TtsRequest) -> Result<AudioChunkStream> {
        let voice = self.resolve_voice(request.voice_id).await?;
        self.tts.synthesize_stream(request, voice.as_ref()).await
    }

    /// Built-in voice names
    ///
    /// # Errors
    ///
    /// Returns the engine's error
    pub async fn available_voices(&self) -> Result<Vec<String>> {
        self.tts.available_voices().await
    }

    /// Supported language codes
    ///
    /// # Errors
    ///
    /// Returns the engine's error
    pub async fn supported_languages(&self) -> Result<Vec<String>> {
        self.tts.supported_languages().await
    }
}
