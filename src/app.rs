//! Application wiring
//!
//! Every adapter is constructed once here and handed to the services as a
//! trait object. Nothing else in the crate builds concrete adapters.

use std::sync::Arc;

use crate::Result;
use crate::adapters::{FileVoiceRepository, RemoteTtsEngine};
use crate::api::ApiState;
use crate::audio::{
    AudioCaptureHub, AudioSink, CaptureBackend, CpalCaptureBackend, CpalSink,
    ManualCaptureBackend, NullSink, PlaybackDriver,
};
use crate::config::{CaptureConfig, Config};
use crate::ports::{AudioPlaybackPort, AudioStreamPort, TtsEngine, VoiceRepository};
use crate::services::{
    AudioPlaybackService, CloneSpeechService, SynthPlayService, TextToSpeechService,
};

/// Concrete implementations behind the ports
pub struct Adapters {
    pub engine: Arc<dyn TtsEngine>,
    pub repository: Arc<dyn VoiceRepository>,
    pub sink: Arc<dyn AudioSink>,
    pub capture_backend: Arc<dyn CaptureBackend>,
}

impl Adapters {
    /// Build the production adapters for a configuration
    ///
    /// With audio disabled, playback goes to a silent sink and the capture
    /// hub opens a stream that never delivers frames.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an unusable engine configuration and
    /// `Error::Repository` if the voices directory cannot be created
    pub fn from_config(config: &Config) -> Result<Self> {
        let engine = RemoteTtsEngine::new(&config.tts)?;
        let repository = FileVoiceRepository::new(&config.repository.voices_dir)?;

        let (sink, capture_backend): (Arc<dyn AudioSink>, Arc<dyn CaptureBackend>) =
            if config.audio.enabled {
                (
                    Arc::new(CpalSink::new(
                        config.audio.device_index,
                        config.audio.device_name.clone(),
                        config.audio.buffer_size,
                    )),
                    Arc::new(CpalCaptureBackend::new(config.capture.device_name.clone())),
                )
            } else {
                tracing::warn!("audio hardware disabled, running headless");
                (
                    Arc::new(NullSink::realtime()),
                    Arc::new(ManualCaptureBackend::new()),
                )
            };

        Ok(Self {
            engine: Arc::new(engine),
            repository: Arc::new(repository),
            sink,
            capture_backend,
        })
    }
}

/// Fully wired services
pub struct App {
    pub tts: Arc<TextToSpeechService>,
    pub voices: Arc<CloneSpeechService>,
    pub playback: Arc<AudioPlaybackService>,
    pub synth_play: Arc<SynthPlayService>,
    pub capture: Arc<AudioCaptureHub>,
    capture_max_frames: usize,
    default_speed: f32,
}

impl App {
    /// Wire the production adapters for a configuration
    ///
    /// # Errors
    ///
    /// See [`Adapters::from_config`]
    pub fn build(config: &Config) -> Result<Self> {
        let adapters = Adapters::from_config(config)?;
        tracing::info!(
            provider = ?config.tts.provider,
            url = %config.tts.url,
            voices_dir = %config.repository.voices_dir.display(),
            audio = config.audio.enabled,
            "services wired"
        );
        Ok(Self::with_adapters(adapters, &config.capture, config.tts.speed))
    }

    /// Wire services around the given adapters
    ///
    /// `default_speed` applies to every synthesis that doesn't ask for a speed.
    #[must_use]
    pub fn with_adapters(adapters: Adapters, capture: &CaptureConfig, default_speed: f32) -> Self {
        let driver: Arc<dyn AudioPlaybackPort> = Arc::new(PlaybackDriver::new(adapters.sink));
        let hub = Arc::new(AudioCaptureHub::new(
            adapters.capture_backend,
            capture.format,
            capture.drop_policy,
        ));

        Self {
            tts: Arc::new(TextToSpeechService::new(
                Arc::clone(&adapters.engine),
                Arc::clone(&adapters.repository),
            )),
            voices: Arc::new(CloneSpeechService::new(
                Arc::clone(&adapters.engine),
                adapters.repository,
            )),
            playback: Arc::new(AudioPlaybackService::new(Arc::clone(&driver))),
            synth_play: Arc::new(
                SynthPlayService::new(adapters.engine, driver).with_speed(default_speed),
            ),
            capture: hub,
            capture_max_frames: capture.max_frames,
            default_speed,
        }
    }

    /// Handler state for the HTTP API
    #[must_use]
    pub fn api_state(&self) -> ApiState {
        ApiState {
            tts: Arc::clone(&self.tts),
            voices: Arc::clone(&self.voices),
            playback: Arc::clone(&self.playback),
            synth_play: Arc::clone(&self.synth_play),
            capture: Arc::clone(&self.capture) as Arc<dyn AudioStreamPort>,
            capture_max_frames: self.capture_max_frames,
            default_speed: self.default_speed,
        }
    }
}
