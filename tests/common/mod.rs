//! Shared test utilities
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tts_server::app::{Adapters, App};
use tts_server::audio::wav::samples_to_wav;
use tts_server::audio::{DropPolicy, ManualCaptureBackend, ManualFeed, NullSink};
use tts_server::config::CaptureConfig;
use tts_server::domain::{CloneRequest, StreamFormat, TtsRequest, TtsResponse, VoiceModel};
use tts_server::ports::TtsEngine;
use tts_server::{Error, Result};

pub const TONE_RATE: u32 = 22_050;

/// A 440Hz tone as mono f32 samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn tone(seconds: f32) -> Vec<f32> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let len = (TONE_RATE as f32 * seconds) as usize;
    (0..len)
        .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / TONE_RATE as f32).sin() * 0.3)
        .collect()
}

/// 16-bit PCM bytes for a tone
#[must_use]
pub fn tone_pcm(seconds: f32) -> Vec<u8> {
    tone(seconds)
        .iter()
        .flat_map(|s| {
            #[allow(clippy::cast_possible_truncation)]
            let v = (s * 32767.0) as i16;
            v.to_le_bytes()
        })
        .collect()
}

/// Write a mono WAV file of the given length and return its path
pub fn write_wav(dir: &Path, name: &str, seconds: f32) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, samples_to_wav(&tone(seconds), TONE_RATE).unwrap()).unwrap();
    path
}

/// Engine that returns a fixed-length tone and records every request
pub struct ToneEngine {
    pub seconds: f32,
    pub requests: Mutex<Vec<(TtsRequest, Option<VoiceModel>)>>,
}

impl ToneEngine {
    #[must_use]
    pub fn new(seconds: f32) -> Self {
        Self {
            seconds,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(TtsRequest, Option<VoiceModel>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TtsEngine for ToneEngine {
    async fn synthesize(
        &self,
        request: &TtsRequest,
        voice: Option<&VoiceModel>,
    ) -> Result<TtsResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((request.clone(), voice.cloned()));
        let pcm = tone_pcm(self.seconds);
        let frames = u32::try_from(pcm.len() / 2).unwrap();
        Ok(TtsResponse {
            duration_seconds: f64::from(frames) / f64::from(TONE_RATE),
            pcm,
            sample_rate: TONE_RATE,
            channels: 1,
        })
    }

    async fn clone_voice(&self, request: CloneRequest) -> Result<VoiceModel> {
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
        Ok(vec!["default".to_string()])
    }

    async fn supported_languages(&self) -> Result<Vec<String>> {
        Ok(vec!["en".to_string(), "de".to_string()])
    }
}

/// Engine whose synthesis always fails
pub struct FailingEngine;

#[async_trait]
impl TtsEngine for FailingEngine {
    async fn synthesize(
        &self,
        _request: &TtsRequest,
        _voice: Option<&VoiceModel>,
    ) -> Result<TtsResponse> {
        Err(Error::Synthesis("engine unavailable".to_string()))
    }

    async fn clone_voice(&self, _request: CloneRequest) -> Result<VoiceModel> {
        Err(Error::Synthesis("engine unavailable".to_string()))
    }

    async fn available_voices(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn supported_languages(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Application wired to fake hardware and a temporary voice store
pub struct TestApp {
    pub app: App,
    pub sink: Arc<NullSink>,
    pub feed: ManualFeed,
    pub dir: tempfile::TempDir,
}

/// Build an application around `engine` with headless audio
#[must_use]
pub fn test_app(engine: Arc<dyn TtsEngine>) -> TestApp {
    test_app_with_sink(engine, NullSink::new())
}

/// Build an application around `engine` with a specific sink
#[must_use]
pub fn test_app_with_sink(engine: Arc<dyn TtsEngine>, sink: NullSink) -> TestApp {
    build_test_app(engine, sink, 1.0)
}

/// Build an application around `engine` with a configured default speed
#[must_use]
pub fn test_app_with_speed(engine: Arc<dyn TtsEngine>, speed: f32) -> TestApp {
    build_test_app(engine, NullSink::new(), speed)
}

fn build_test_app(engine: Arc<dyn TtsEngine>, sink: NullSink, speed: f32) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let repository =
        tts_server::adapters::FileVoiceRepository::new(dir.path().join("voices")).unwrap();
    let sink = Arc::new(sink);
    let backend = ManualCaptureBackend::new();
    let feed = backend.feed();

    let app = App::with_adapters(
        Adapters {
            engine,
            repository: Arc::new(repository),
            sink: Arc::clone(&sink) as _,
            capture_backend: Arc::new(backend),
        },
        &CaptureConfig {
            device_name: None,
            format: StreamFormat::default(),
            max_frames: 16,
            drop_policy: DropPolicy::DropNewest,
        },
        speed,
    );

    TestApp {
        app,
        sink,
        feed,
        dir,
    }
}
