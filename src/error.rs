//! Error types for the TTS server

use thiserror::Error;

/// Result type alias for TTS server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the TTS server
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio hardware error (stream open/close, device query)
    #[error("audio device error: {0}")]
    Device(String),

    /// Missing file or voice
    #[error("not found: {0}")]
    NotFound(String),

    /// Wrong file type, unsupported sample width, malformed PCM or empty text
    #[error("format error: {0}")]
    Format(String),

    /// Text-to-speech engine error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Playback failed after the device was opened
    #[error("playback error: {0}")]
    Playback(String),

    /// Voice repository error
    #[error("repository error: {0}")]
    Repository(String),

    /// A notification channel has no receiver left
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WAV encode/decode error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

/// Coarse error taxonomy used by the boundary layer to pick client-visible outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Device,
    NotFound,
    Format,
    Synthesis,
    Playback,
    Other,
}

impl Error {
    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Device(_) => ErrorKind::Device,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Format(_) | Self::Wav(_) => ErrorKind::Format,
            Self::Synthesis(_) | Self::Http(_) => ErrorKind::Synthesis,
            Self::Playback(_) => ErrorKind::Playback,
            Self::Config(_)
            | Self::Repository(_)
            | Self::ChannelClosed(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Toml(_) => ErrorKind::Other,
        }
    }
}
