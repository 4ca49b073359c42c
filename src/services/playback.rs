//! Host playback service

use std::path::Path;
use std::sync::Arc;

use crate::domain::{PlaybackRequest, PlaybackStatus};
use crate::ports::AudioPlaybackPort;
use crate::{Error, Result};

/// Validates playback requests before handing them to the audio port
pub struct AudioPlaybackService {
    audio: Arc<dyn AudioPlaybackPort>,
}

impl AudioPlaybackService {
    #[must_use]
    pub fn new(audio: Arc<dyn AudioPlaybackPort>) -> Self {
        Self { audio }
    }

    /// Play 16-bit PCM through the speakers, resolving when done
    ///
    /// # Errors
    ///
    /// Returns the audio port's error
    pub async fn play(&self, pcm: Vec<u8>, sample_rate: u32, channels: u16) -> Result<PlaybackStatus> {
        self.audio
            .play(PlaybackRequest {
                pcm,
                sample_rate,
                channels,
            })
            .await
    }

    /// Play a WAV file given by absolute path
    ///
    /// # Errors
    ///
    /// Returns `Error::Format` for a relative path or non-`.wav` file and
    /// `Error::NotFound` for a missing file
    pub async fn play_file(&self, file_path: &str) -> Result<PlaybackStatus> {
        let path = Path::new(file_path);
        if !path.is_absolute() {
            return Err(Error::Format(format!("file path must be absolute: {file_path}")));
        }
        if !path.exists() {
            return Err(Error::NotFound(format!("WAV file not found: {file_path}")));
        }
        let is_wav = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if !is_wav {
            return Err(Error::Format(format!(
                "file must have .wav extension: {file_path}"
            )));
        }

        self.audio.play_file(path).await
    }

    pub async fn stop(&self) {
        self.audio.stop().await;
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.audio.is_playing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{NullSink, PlaybackDriver};

    fn service() -> AudioPlaybackService {
        AudioPlaybackService::new(Arc::new(PlaybackDriver::new(Arc::new(NullSink::new()))))
    }

    #[tokio::test]
    async fn relative_path_is_rejected_first() {
        let err = service().play_file("clips/missing.wav").await.unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = service()
            .play_file("/definitely/not/here.wav")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn wrong_extension_is_format_error() {
        let file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
        let path = file.path().to_string_lossy().to_string();
        let err = service().play_file(&path).await.unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[tokio::test]
    async fn uppercase_extension_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CLIP.WAV");
        std::fs::write(
            &path,
            crate::audio::wav::samples_to_wav(&[0.0; 1600], 16_000).unwrap(),
        )
        .unwrap();

        let status = service()
            .play_file(&path.to_string_lossy())
            .await
            .unwrap();
        assert_eq!(status.duration_seconds, Some(0.1));
    }
}
