//! Capability interfaces consumed by the domain services
//!
//! Services depend only on these traits; concrete adapters are built once at
//! startup (see [`crate::app`]) and injected as trait objects.

mod audio;
mod repository;
mod tts;

pub use audio::{AudioPlaybackPort, AudioStreamPort, FrameReader};
pub use repository::VoiceRepository;
pub use tts::{AudioChunkStream, STREAM_CHUNK_SIZE, TtsEngine};
