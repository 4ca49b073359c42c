//! TOML configuration file loading
//!
//! Looks for `./config.toml`, then `~/.config/tts-server/config.toml`.
//! All fields are optional: the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::audio::DropPolicy;
use crate::domain::SampleFormat;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Speech engine connection
    #[serde(default)]
    pub tts: TtsFileConfig,

    #[serde(default)]
    pub repository: RepositoryFileConfig,

    /// Host playback
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Microphone capture hub
    #[serde(default)]
    pub capture: CaptureFileConfig,
}

/// HTTP server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Speech engine configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Engine protocol ("coqui" or "openai")
    pub provider: Option<String>,

    /// Base URL of the engine server
    pub url: Option<String>,

    /// Model identifier (e.g. "tts_models/en/ljspeech/tacotron2-DDC")
    pub model: Option<String>,

    /// Default voice or speaker name
    pub voice: Option<String>,

    pub api_key: Option<String>,

    /// Default speed multiplier
    pub speed: Option<f32>,

    /// Language codes reported to clients
    pub languages: Option<Vec<String>>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Voice repository configuration
#[derive(Debug, Default, Deserialize)]
pub struct RepositoryFileConfig {
    /// Directory holding `metadata.json` and the `.voice` files
    pub voices_dir: Option<String>,
}

/// Playback configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Use real audio hardware; `false` runs headless
    pub enabled: Option<bool>,

    /// Output device position as listed by `tts-server devices`
    pub device_index: Option<usize>,

    /// Output device name (substring match)
    pub device_name: Option<String>,

    /// Output buffer size in frames
    pub buffer_size: Option<u32>,
}

/// Capture hub configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Input device name (substring match)
    pub device_name: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub block_size: Option<u32>,
    pub sample_format: Option<SampleFormat>,

    /// Default per-subscriber queue capacity
    pub max_frames: Option<usize>,
    pub drop_policy: Option<DropPolicy>,
}

/// Load the TOML config file
///
/// An explicit path wins over the standard locations. Returns
/// `ConfigFile::default()` if no file exists or it can't be parsed.
pub fn load_config_file(explicit: Option<&Path>) -> ConfigFile {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match config_file_path() {
            Some(path) => path,
            None => return ConfigFile::default(),
        },
    };

    if !path.exists() {
        if explicit.is_some() {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
        }
        return ConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns the TOML error for malformed content
pub fn parse(content: &str) -> crate::Result<ConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the first existing config file: `./config.toml`, then
/// `~/.config/tts-server/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    let local = PathBuf::from("config.toml");
    if local.exists() {
        return Some(local);
    }
    directories::BaseDirs::new().map(|d| d.config_dir().join("tts-server").join("config.toml"))
}
