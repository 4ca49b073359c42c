//! Configuration management for the TTS server
//!
//! Precedence is env > TOML file > default.

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::audio::{DEFAULT_MAX_FRAMES, DropPolicy};
use crate::domain::{MAX_SPEED, MIN_SPEED, StreamFormat};
use crate::{Error, Result};

/// Default Coqui model
pub const DEFAULT_MODEL: &str = "tts_models/en/ljspeech/tacotron2-DDC";

/// TTS server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub tts: TtsConfig,
    pub repository: RepositoryConfig,
    pub audio: AudioConfig,
    pub capture: CaptureConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// `host:port` bind address
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Wire protocol of the speech engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsProvider {
    /// Coqui `tts-server` (`GET /api/tts`)
    #[default]
    Coqui,
    /// `OpenAI`-compatible speech endpoint (`POST /v1/audio/speech`)
    OpenAi,
}

impl TtsProvider {
    #[must_use]
    pub const fn default_url(self) -> &'static str {
        match self {
            Self::Coqui => "http://localhost:5002",
            Self::OpenAi => "https://api.openai.com",
        }
    }

    #[must_use]
    pub const fn default_voice(self) -> &'static str {
        match self {
            Self::Coqui => "default",
            Self::OpenAi => "alloy",
        }
    }
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "coqui" => Ok(Self::Coqui),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Speech engine configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub provider: TtsProvider,
    pub url: String,
    pub model: String,
    pub voice: String,
    pub api_key: Option<String>,
    pub speed: f32,
    pub languages: Vec<String>,
    pub timeout_secs: u64,
}

/// Voice repository configuration
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub voices_dir: PathBuf,
}

/// Playback configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Use audio hardware; when disabled playback and capture run headless
    pub enabled: bool,
    pub device_index: Option<usize>,
    pub device_name: Option<String>,
    pub buffer_size: Option<u32>,
}

/// Capture hub configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub device_name: Option<String>,
    pub format: StreamFormat,
    pub max_frames: usize,
    pub drop_policy: DropPolicy,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if an environment variable holds an invalid value
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path);
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if an environment variable holds an invalid value
    pub fn resolve(fc: file::ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let server = ServerConfig {
            host: env("TTS_HOST")
                .or(fc.server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_env(&env, "TTS_PORT")?
                .or(fc.server.port)
                .unwrap_or(8000),
        };

        // Speech engine (env > toml > provider default)
        let provider = match env("TTS_ENGINE_PROVIDER").or(fc.tts.provider) {
            Some(p) => p.parse()?,
            None => TtsProvider::default(),
        };
        let speed = fc.tts.speed.unwrap_or(1.0);
        if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            return Err(Error::Config(format!(
                "tts speed must be between {MIN_SPEED} and {MAX_SPEED}, got {speed}"
            )));
        }
        let tts = TtsConfig {
            provider,
            url: env("TTS_ENGINE_URL")
                .or(fc.tts.url)
                .unwrap_or_else(|| provider.default_url().to_string()),
            model: env("TTS_MODEL").or(fc.tts.model).unwrap_or_else(|| match provider {
                TtsProvider::Coqui => DEFAULT_MODEL.to_string(),
                TtsProvider::OpenAi => "tts-1".to_string(),
            }),
            voice: env("TTS_VOICE")
                .or(fc.tts.voice)
                .unwrap_or_else(|| provider.default_voice().to_string()),
            api_key: env("TTS_API_KEY")
                .or_else(|| env("OPENAI_API_KEY"))
                .or(fc.tts.api_key),
            speed,
            languages: fc
                .tts
                .languages
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| vec!["en".to_string()]),
            timeout_secs: fc.tts.timeout_secs.unwrap_or(120),
        };

        let voices_dir = env("TTS_VOICES_DIR")
            .or(fc.repository.voices_dir)
            .map_or_else(default_voices_dir, |p| expand_home(&p));

        let disabled = env("TTS_DISABLE_AUDIO").is_some_and(|v| is_truthy(&v));
        let audio = AudioConfig {
            enabled: !disabled && fc.audio.enabled.unwrap_or(true),
            device_index: parse_env(&env, "TTS_AUDIO_DEVICE_INDEX")?.or(fc.audio.device_index),
            device_name: env("TTS_AUDIO_DEVICE").or(fc.audio.device_name),
            buffer_size: fc.audio.buffer_size,
        };

        let defaults = StreamFormat::default();
        let capture = CaptureConfig {
            device_name: env("TTS_CAPTURE_DEVICE").or(fc.capture.device_name),
            format: StreamFormat {
                sample_rate: fc.capture.sample_rate.unwrap_or(defaults.sample_rate),
                channels: fc.capture.channels.unwrap_or(defaults.channels),
                block_size: fc.capture.block_size.unwrap_or(defaults.block_size),
                sample_format: fc.capture.sample_format.unwrap_or(defaults.sample_format),
            },
            max_frames: fc.capture.max_frames.unwrap_or(DEFAULT_MAX_FRAMES),
            drop_policy: fc.capture.drop_policy.unwrap_or_default(),
        };

        Ok(Self {
            server,
            tts,
            repository: RepositoryConfig { voices_dir },
            audio,
            capture,
        })
    }
}

fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    env(key)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid value for {key}: {v}")))
        })
        .transpose()
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
}

fn default_voices_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".cache/tts-server/voices"),
        |d| d.cache_dir().join("tts-server").join("voices"),
    )
}

/// Expand a leading `~/` to the home directory
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => directories::BaseDirs::new()
            .map_or_else(|| PathBuf::from(path), |d| d.home_dir().join(rest)),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(toml: &str, vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::resolve(file::parse(toml).unwrap(), |k| vars.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let config = resolve("", &[]).unwrap();
        assert_eq!(config.server.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.tts.provider, TtsProvider::Coqui);
        assert_eq!(config.tts.model, DEFAULT_MODEL);
        assert_eq!(config.tts.languages, vec!["en"]);
        assert!(config.audio.enabled);
        assert_eq!(config.capture.format, StreamFormat::default());
        assert_eq!(config.capture.max_frames, 1024);
        assert_eq!(config.capture.drop_policy, DropPolicy::DropNewest);
        assert!(config.repository.voices_dir.ends_with("tts-server/voices"));
    }

    #[test]
    fn env_overrides_file() {
        let config = resolve(
            "[server]\nport = 9000\nhost = \"127.0.0.1\"\n",
            &[("TTS_PORT", "9100")],
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn provider_sets_url_and_model_defaults() {
        let config = resolve("", &[("TTS_ENGINE_PROVIDER", "OpenAI"), ("OPENAI_API_KEY", "sk-test")])
            .unwrap();
        assert_eq!(config.tts.provider, TtsProvider::OpenAi);
        assert_eq!(config.tts.url, "https://api.openai.com");
        assert_eq!(config.tts.model, "tts-1");
        assert_eq!(config.tts.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn invalid_env_is_config_error() {
        let err = resolve("", &[("TTS_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = resolve("", &[("TTS_ENGINE_PROVIDER", "festival")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn speed_from_file_is_bounded() {
        let config = resolve("[tts]\nspeed = 1.25\n", &[]).unwrap();
        assert!((config.tts.speed - 1.25).abs() < f32::EPSILON);

        let err = resolve("[tts]\nspeed = 4.0\n", &[]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn audio_can_be_disabled_from_env() {
        let config = resolve("[audio]\nenabled = true\n", &[("TTS_DISABLE_AUDIO", "1")]).unwrap();
        assert!(!config.audio.enabled);
    }

    #[test]
    fn device_index_from_env() {
        let config = resolve("", &[("TTS_AUDIO_DEVICE_INDEX", "3")]).unwrap();
        assert_eq!(config.audio.device_index, Some(3));
    }

    #[test]
    fn relative_voices_dir_kept() {
        let config = resolve("[repository]\nvoices_dir = \"data/voices\"\n", &[]).unwrap();
        assert_eq!(config.repository.voices_dir, PathBuf::from("data/voices"));
    }
}
