//! TTS Server - local text-to-speech with host audio I/O
//!
//! This library provides the core functionality for the TTS server:
//! - Speech synthesis through a remote engine, with cloned reference voices
//! - Playback of synthesized speech and WAV files on the host speakers
//! - Live microphone capture fanned out to any number of subscribers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   HTTP / WebSocket                   │
//! │   /tts  │  /voices  │  /audio  │  /ws/capture  │ ... │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Services                         │
//! │   TextToSpeech  │  CloneSpeech  │  Playback  │ Synth │
//! └────────────────────┬────────────────────────────────┘
//!                      │ ports
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Adapters                         │
//! │   Remote engine │ File repo │ PlaybackDriver │ Hub   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod api;
pub mod app;
pub mod audio;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod services;

pub use app::App;
pub use config::Config;
pub use error::{Error, Result};
