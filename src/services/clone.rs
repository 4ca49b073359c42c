//! Voice cloning and stored-voice management

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{CloneRequest, VoiceModel};
use crate::ports::{TtsEngine, VoiceRepository};
use crate::{Error, Result};

pub struct CloneSpeechService {
    tts: Arc<dyn TtsEngine>,
    voices: Arc<dyn VoiceRepository>,
}

impl CloneSpeechService {
    #[must_use]
    pub fn new(tts: Arc<dyn TtsEngine>, voices: Arc<dyn VoiceRepository>) -> Self {
        Self { tts, voices }
    }

    /// Clone a voice and persist it
    ///
    /// The first sample is stored as the voice's reference audio.
    ///
    /// # Errors
    ///
    /// Returns `Error::Format` when no non-empty sample is given, otherwise the
    /// engine's or repository's error
    pub async fn clone_voice(&self, request: CloneRequest) -> Result<VoiceModel> {
        let reference = match request.audio_samples.first() {
            Some(sample) if !sample.is_empty() => sample.clone(),
            _ => {
                return Err(Error::Format(
                    "at least one non-empty audio sample is required".to_string(),
                ));
            }
        };

        let name = request.name.clone();
        let samples = request.audio_samples.len();
        let voice = self.tts.clone_voice(request).await?;
        let voice = self.voices.save(voice, &reference).await?;

        tracing::info!(id = %voice.id, name = %name, samples, "voice cloned");
        Ok(voice)
    }

    /// # Errors
    ///
    /// Returns the repository's error
    pub async fn get_voice(&self, id: Uuid) -> Result<Option<VoiceModel>> {
        self.voices.get(id).await
    }

    /// # Errors
    ///
    /// Returns the repository's error
    pub async fn list_voices(&self) -> Result<Vec<VoiceModel>> {
        self.voices.list_all().await
    }

    /// Delete a voice; `false` when it did not exist
    ///
    /// # Errors
    ///
    /// Returns the repository's error
    pub async fn delete_voice(&self, id: Uuid) -> Result<bool> {
        let deleted = self.voices.delete(id).await?;
        if deleted {
            tracing::info!(id = %id, "voice deleted");
        }
        Ok(deleted)
    }

    /// # Errors
    ///
    /// Returns the repository's error
    pub async fn voice_exists(&self, id: Uuid) -> Result<bool> {
        self.voices.exists(id).await
    }
}
