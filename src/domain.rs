//! Domain models shared by ports, services and adapters

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default synthesis language
pub const DEFAULT_LANGUAGE: &str = "en";

/// Accepted range of the synthesis speed multiplier
pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

/// Sample representation delivered by the capture runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    #[default]
    F32,
    I16,
}

/// Format of a captured audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per hardware block
    pub block_size: u32,
    pub sample_format: SampleFormat,
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            block_size: 1024,
            sample_format: SampleFormat::F32,
        }
    }
}

/// Interleaved samples of one captured block
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSamples {
    F32(Arc<[f32]>),
    I16(Arc<[i16]>),
}

impl FrameSamples {
    /// Number of interleaved samples
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::F32(s) => s.len(),
            Self::I16(s) => s.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Little-endian byte encoding of the samples
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::F32(s) => s.iter().flat_map(|v| v.to_le_bytes()).collect(),
            Self::I16(s) => s.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }
}

/// Immutable snapshot of one captured audio buffer
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: FrameSamples,
    pub format: StreamFormat,
    /// Hub-wide sequence number, reset to zero on every stream start
    pub sequence: u64,
}

/// Request for text-to-speech synthesis
#[derive(Debug, Clone, PartialEq)]
pub struct TtsRequest {
    pub text: String,
    pub voice_id: Option<Uuid>,
    pub language: String,
    pub speed: f32,
}

impl TtsRequest {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: None,
            language: DEFAULT_LANGUAGE.to_string(),
            speed: 1.0,
        }
    }
}

/// Synthesized speech as 16-bit signed little-endian PCM
#[derive(Debug, Clone, PartialEq)]
pub struct TtsResponse {
    pub pcm: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_seconds: f64,
}

/// A stored voice model used as a synthesis reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceModel {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_language")]
    pub language: String,
    pub created_at: DateTime<Utc>,
    /// Stored reference audio, set by the repository on save
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl VoiceModel {
    /// Create a voice with a fresh id and the current timestamp
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            created_at: Utc::now(),
            file_path: None,
            metadata: serde_json::Map::new(),
        }
    }
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// Request for voice cloning from audio samples
#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub name: String,
    pub audio_samples: Vec<Vec<u8>>,
    pub description: String,
    pub language: String,
}

/// Request for audio playback on the host device
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    /// 16-bit signed little-endian PCM, interleaved
    pub pcm: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Status of audio playback
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackStatus {
    pub is_playing: bool,
    pub duration_seconds: Option<f64>,
}

impl PlaybackStatus {
    #[must_use]
    pub const fn finished(duration_seconds: f64) -> Self {
        Self {
            is_playing: false,
            duration_seconds: Some(duration_seconds),
        }
    }

    #[must_use]
    pub const fn idle() -> Self {
        Self {
            is_playing: false,
            duration_seconds: None,
        }
    }
}

/// States of one synthesize-and-play call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthPlayState {
    Synthesizing,
    Playing,
    Completed,
    Error,
}

impl SynthPlayState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synthesizing => "synthesizing",
            Self::Playing => "playing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// One state transition reported to an observer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    pub state: SynthPlayState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_model_json_roundtrip_keeps_metadata() {
        let mut voice = VoiceModel::new("narrator");
        voice
            .metadata
            .insert("num_samples".to_string(), serde_json::json!(3));

        let json = serde_json::to_string(&voice).unwrap();
        let parsed: VoiceModel = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, voice);
    }

    #[test]
    fn voice_model_defaults_missing_fields() {
        let json = r#"{
            "id": "6f1c2d5e-8a39-4b3e-9f0e-0d6a3f1b2c4d",
            "name": "legacy",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let voice: VoiceModel = serde_json::from_str(json).unwrap();
        assert_eq!(voice.language, "en");
        assert!(voice.file_path.is_none());
        assert!(voice.metadata.is_empty());
    }

    #[test]
    fn state_serializes_lowercase() {
        let change = StateChange {
            state: SynthPlayState::Synthesizing,
            message: Some("Synthesizing: hi...".to_string()),
            duration_seconds: None,
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["state"], "synthesizing");
        assert!(json.get("duration_seconds").is_none());
    }

    #[test]
    fn frame_samples_le_bytes() {
        let samples = FrameSamples::I16(Arc::from(vec![1i16, -2]));
        assert_eq!(samples.to_le_bytes(), vec![0x01, 0x00, 0xFE, 0xFF]);
        assert_eq!(samples.len(), 2);
    }
}
