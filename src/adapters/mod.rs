//! Concrete implementations of the capability ports

mod repository;
mod tts;

pub use repository::FileVoiceRepository;
pub use tts::RemoteTtsEngine;
