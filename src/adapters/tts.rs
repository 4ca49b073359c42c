//! HTTP speech engine adapter
//!
//! The neural model runs in a separate server; this adapter speaks either the
//! Coqui `tts-server` protocol or an `OpenAI`-compatible speech endpoint and
//! converts the returned WAV into PCM.

use std::time::Duration;

use async_trait::async_trait;

use crate::audio::wav;
use crate::config::{TtsConfig, TtsProvider};
use crate::domain::{CloneRequest, TtsRequest, TtsResponse, VoiceModel};
use crate::ports::TtsEngine;
use crate::{Error, Result};

/// Speech engine reached over HTTP
pub struct RemoteTtsEngine {
    client: reqwest::Client,
    provider: TtsProvider,
    base_url: String,
    model: String,
    voice: String,
    api_key: Option<String>,
    languages: Vec<String>,
}

impl RemoteTtsEngine {
    /// Create an engine client from configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the `OpenAI` provider has no API key
    pub fn new(config: &TtsConfig) -> Result<Self> {
        if config.provider == TtsProvider::OpenAi
            && config.api_key.as_deref().is_none_or(str::is_empty)
        {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            provider: config.provider,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            api_key: config.api_key.clone(),
            languages: config.languages.clone(),
        })
    }

    /// Synthesize using a Coqui `tts-server`
    async fn synthesize_coqui(
        &self,
        request: &TtsRequest,
        voice: Option<&VoiceModel>,
    ) -> Result<Vec<u8>> {
        let mut query: Vec<(&str, String)> = vec![
            ("text", request.text.clone()),
            ("language_id", request.language.clone()),
        ];
        match voice.and_then(|v| v.file_path.as_ref()) {
            Some(path) => query.push(("speaker_wav", path.to_string_lossy().to_string())),
            None if self.voice != "default" => query.push(("speaker_id", self.voice.clone())),
            None => {}
        }

        let response = self
            .client
            .get(format!("{}/api/tts", self.base_url))
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("Coqui TTS error {status}: {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Synthesize using an `OpenAI`-compatible endpoint
    async fn synthesize_openai(&self, request: &TtsRequest) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        let body = SpeechRequest {
            model: &self.model,
            input: &request.text,
            voice: &self.voice,
            speed: request.speed,
            response_format: "wav",
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("OpenAI TTS error {status}: {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl TtsEngine for RemoteTtsEngine {
    async fn synthesize(
        &self,
        request: &TtsRequest,
        voice: Option<&VoiceModel>,
    ) -> Result<TtsResponse> {
        let audio = match self.provider {
            TtsProvider::Coqui => self.synthesize_coqui(request, voice).await?,
            TtsProvider::OpenAi => {
                if voice.is_some() {
                    tracing::debug!("OpenAI provider ignores cloned voice references");
                }
                self.synthesize_openai(request).await?
            }
        };

        let clip = wav::decode_wav(&audio)
            .map_err(|e| Error::Synthesis(format!("engine returned undecodable audio: {e}")))?;
        tracing::debug!(
            bytes = audio.len(),
            sample_rate = clip.sample_rate,
            channels = clip.channels,
            "engine response decoded"
        );

        Ok(TtsResponse {
            pcm: clip.to_pcm16(),
            sample_rate: clip.sample_rate,
            channels: clip.channels,
            duration_seconds: clip.duration_seconds(),
        })
    }

    async fn clone_voice(&self, request: CloneRequest) -> Result<VoiceModel> {
        // Reference audio is applied at synthesis time; cloning only records metadata
        let mut voice = VoiceModel::new(request.name);
        voice.description = request.description;
        voice.language = request.language;
        voice.metadata.insert(
            "num_samples".to_string(),
            serde_json::json!(request.audio_samples.len()),
        );
        Ok(voice)
    }

    async fn available_voices(&self) -> Result<Vec<String>> {
        Ok(vec![self.voice.clone()])
    }

    async fn supported_languages(&self) -> Result<Vec<String>> {
        Ok(self.languages.clone())
    }
}
