//! Audio playback and capture ports

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;
use crate::domain::{AudioFrame, PlaybackRequest, PlaybackStatus, StreamFormat};

/// Plays audio through the host's speakers
#[async_trait]
pub trait AudioPlaybackPort: Send + Sync {
    /// Play 16-bit PCM, resolving once playback has finished
    ///
    /// # Errors
    ///
    /// Returns `Error::Format` for malformed PCM and `Error::Device` when no
    /// output device is available
    async fn play(&self, request: PlaybackRequest) -> Result<PlaybackStatus>;

    /// Stop any current playback immediately
    async fn stop(&self);

    /// Whether audio is currently playing
    fn is_playing(&self) -> bool;

    /// Play a WAV file, resolving once playback has finished
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the file does not exist and
    /// `Error::Format` if it is not a supported WAV file
    async fn play_file(&self, path: &Path) -> Result<PlaybackStatus>;
}

/// Consumer side of one capture subscription
pub trait FrameReader: Send + Sync {
    /// Next frame in capture order
    ///
    /// `None` blocks indefinitely, `Some(Duration::ZERO)` polls. Returns
    /// `None` on timeout or once the subscription is closed.
    fn read(&self, timeout: Option<Duration>) -> Option<Arc<AudioFrame>>;

    /// Close the subscription, discarding buffered frames
    fn close(&self);

    fn is_closed(&self) -> bool;

    /// Frames dropped because the reader fell behind
    fn dropped(&self) -> u64;
}

/// Live microphone capture with pub-sub fan-out
pub trait AudioStreamPort: Send + Sync {
    /// Register a new subscriber buffering at most `max_frames` frames
    fn subscribe(&self, name: &str, max_frames: usize) -> Box<dyn FrameReader>;

    /// Open the input stream (no-op when already running)
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if no input stream can be opened
    fn start(&self) -> Result<()>;

    /// Close every subscriber and release the input stream
    fn stop(&self);

    fn is_running(&self) -> bool;

    /// Number of live subscriptions
    fn subscriber_count(&self) -> usize;

    /// Format of every frame the stream delivers
    fn format(&self) -> StreamFormat;
}
