//! Audio playback to speakers
//!
//! [`PlaybackDriver`] owns the playing flag and the cancel token of the
//! current clip. The blocking output work happens in an [`AudioSink`] on a
//! `spawn_blocking` worker, which also keeps the `!Send` cpal stream on the
//! thread that created it.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::device;
use super::wav::{self, AudioClip};
use crate::domain::{PlaybackRequest, PlaybackStatus};
use crate::ports::AudioPlaybackPort;
use crate::{Error, Result};

/// Control quantum for stop and completion checks
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace period past the clip length before giving up on the device
const COMPLETION_SLACK: Duration = Duration::from_millis(500);

/// Shortest wait for the device to play out its last buffer
const MIN_DRAIN: Duration = Duration::from_millis(100);

/// Blocking audio output
pub trait AudioSink: Send + Sync {
    /// Play a clip to completion or until `cancel` is set
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if no output stream can be opened
    fn play_blocking(&self, clip: &AudioClip, cancel: &Arc<AtomicBool>) -> Result<()>;
}

/// Speaker output through cpal
#[derive(Debug, Clone, Default)]
pub struct CpalSink {
    device_index: Option<usize>,
    device_name: Option<String>,
    buffer_size: Option<u32>,
}

impl CpalSink {
    #[must_use]
    pub const fn new(
        device_index: Option<usize>,
        device_name: Option<String>,
        buffer_size: Option<u32>,
    ) -> Self {
        Self {
            device_index,
            device_name,
            buffer_size,
        }
    }

    fn buffer_size(&self) -> cpal::BufferSize {
        self.buffer_size
            .map_or(cpal::BufferSize::Default, cpal::BufferSize::Fixed)
    }
}

#[derive(Default)]
struct Progress {
    position: AtomicUsize,
    finished: AtomicBool,
}

/// Copy the next block of `samples` into a device buffer
///
/// Completion is flagged by the first callback that finds nothing left to
/// copy, i.e. once the device has taken the final block.
fn fill_output(data: &mut [f32], samples: &[f32], progress: &Progress) {
    let pos = progress.position.load(Ordering::Relaxed);
    if pos >= samples.len() {
        data.fill(0.0);
        progress.finished.store(true, Ordering::Release);
        return;
    }

    let available = (samples.len() - pos).min(data.len());
    data[..available].copy_from_slice(&samples[pos..pos + available]);
    data[available..].fill(0.0);
    progress.position.store(pos + available, Ordering::Relaxed);
}

/// How long to keep the stream open after the last callback
fn drain_delay(buffer_frames: Option<u32>, sample_rate: u32) -> Duration {
    buffer_frames.map_or(MIN_DRAIN, |frames| {
        Duration::from_secs_f64(f64::from(frames) / f64::from(sample_rate.max(1))).max(MIN_DRAIN)
    })
}

fn open_output(
    device: &cpal::Device,
    config: &StreamConfig,
    samples: Arc<[f32]>,
    progress: Arc<Progress>,
    cancel: Arc<AtomicBool>,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError> {
    device.build_output_stream(
        config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if cancel.load(Ordering::Relaxed) {
                data.fill(0.0);
                return;
            }
            fill_output(data, &samples, &progress);
        },
        |err| {
            tracing::error!(error = %err, "audio playback error");
        },
        None,
    )
}

impl AudioSink for CpalSink {
    fn play_blocking(&self, clip: &AudioClip, cancel: &Arc<AtomicBool>) -> Result<()> {
        if clip.samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = device::select_output_device(
            &host,
            self.device_index,
            self.device_name.as_deref(),
        )?;
        let name = device.name().unwrap_or_default();

        let native = StreamConfig {
            channels: clip.channels,
            sample_rate: SampleRate(clip.sample_rate),
            buffer_size: self.buffer_size(),
        };
        let progress = Arc::new(Progress::default());

        let (stream, output_rate) = match open_output(
            &device,
            &native,
            Arc::from(clip.samples.as_slice()),
            Arc::clone(&progress),
            Arc::clone(cancel),
        ) {
            Ok(stream) => (stream, clip.sample_rate),
            Err(e) => {
                let fallback = device
                    .default_output_config()
                    .map_err(|e| Error::Device(format!("no usable output config: {e}")))?;
                tracing::debug!(
                    error = %e,
                    clip_rate = clip.sample_rate,
                    device_rate = fallback.sample_rate().0,
                    device_channels = fallback.channels(),
                    "output device rejected clip format, converting"
                );
                let converted = clip.convert(fallback.sample_rate().0, fallback.channels())?;
                let mut config = fallback.config();
                config.buffer_size = self.buffer_size();
                let stream = open_output(
                    &device,
                    &config,
                    Arc::from(converted.samples),
                    Arc::clone(&progress),
                    Arc::clone(cancel),
                )
                .map_err(|e| Error::Device(format!("failed to open output stream: {e}")))?;
                (stream, converted.sample_rate)
            }
        };

        stream
            .play()
            .map_err(|e| Error::Device(format!("failed to start output stream: {e}")))?;

        tracing::debug!(
            device = %name,
            sample_rate = clip.sample_rate,
            channels = clip.channels,
            "audio playback started"
        );

        let timeout = Duration::from_secs_f64(clip.duration_seconds()) + COMPLETION_SLACK;
        let start = Instant::now();
        while !progress.finished.load(Ordering::Acquire) {
            if cancel.load(Ordering::SeqCst) {
                tracing::debug!("playback cancelled");
                break;
            }
            if start.elapsed() > timeout {
                tracing::warn!(device = %name, "playback did not complete in time");
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        if progress.finished.load(Ordering::Acquire) {
            let drain_until = Instant::now() + drain_delay(self.buffer_size, output_rate);
            while Instant::now() < drain_until && !cancel.load(Ordering::SeqCst) {
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        if let Err(e) = stream.pause() {
            tracing::debug!(error = %e, "failed to pause output stream");
        }
        drop(stream);
        tracing::debug!(frames = clip.frames(), "playback complete");

        Ok(())
    }
}

/// Sink that discards audio
///
/// Used when audio output is disabled and in tests. In realtime mode it
/// sleeps for the clip's length so stop and status behave as with hardware.
#[derive(Debug, Default)]
pub struct NullSink {
    realtime: bool,
    played: AtomicUsize,
}

impl NullSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn realtime() -> Self {
        Self {
            realtime: true,
            played: AtomicUsize::new(0),
        }
    }

    /// Number of clips handed to this sink
    #[must_use]
    pub fn played(&self) -> usize {
        self.played.load(Ordering::SeqCst)
    }
}

impl AudioSink for NullSink {
    fn play_blocking(&self, clip: &AudioClip, cancel: &Arc<AtomicBool>) -> Result<()> {
        self.played.fetch_add(1, Ordering::SeqCst);
        if !self.realtime {
            return Ok(());
        }

        let until = Instant::now() + Duration::from_secs_f64(clip.duration_seconds());
        while Instant::now() < until {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }
}

#[derive(Default)]
struct PlaybackState {
    is_playing: bool,
    cancel: Option<Arc<AtomicBool>>,
}

/// Clears the playing flag when the worker finishes, however it finishes
struct PlayingGuard {
    state: Arc<Mutex<PlaybackState>>,
    token: Arc<AtomicBool>,
}

impl Drop for PlayingGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let current = state
            .cancel
            .as_ref()
            .is_some_and(|c| Arc::ptr_eq(c, &self.token));
        if current {
            state.is_playing = false;
            state.cancel = None;
        }
    }
}

/// Plays PCM and WAV audio through an [`AudioSink`]
pub struct PlaybackDriver {
    sink: Arc<dyn AudioSink>,
    state: Arc<Mutex<PlaybackState>>,
}

impl PlaybackDriver {
    #[must_use]
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            sink,
            state: Arc::new(Mutex::new(PlaybackState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Play 16-bit PCM and wait for it to finish
    ///
    /// # Errors
    ///
    /// Returns `Error::Format` for malformed PCM and `Error::Device` if no
    /// output device is available
    pub async fn play(&self, request: PlaybackRequest) -> Result<PlaybackStatus> {
        let clip = AudioClip::from_pcm16(&request.pcm, request.sample_rate, request.channels)?;
        self.play_clip(clip).await
    }

    /// Play a WAV file and wait for it to finish
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the file does not exist and
    /// `Error::Format` if it is not a supported WAV file
    pub async fn play_file(&self, path: &Path) -> Result<PlaybackStatus> {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "audio file not found: {}",
                path.display()
            )));
        }
        let is_wav = path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if !is_wav {
            return Err(Error::Format(format!(
                "only WAV files are supported: {}",
                path.display()
            )));
        }

        let owned: PathBuf = path.to_path_buf();
        let clip = tokio::task::spawn_blocking(move || wav::read_wav_file(&owned))
            .await
            .map_err(|e| Error::Playback(format!("file decode task failed: {e}")))??;

        tracing::info!(path = %path.display(), duration = clip.duration_seconds(), "playing audio file");
        self.play_clip(clip).await
    }

    /// Play a decoded clip, superseding any clip already playing
    ///
    /// # Errors
    ///
    /// Returns the sink's error, or `Error::Playback` if the worker panics
    pub async fn play_clip(&self, clip: AudioClip) -> Result<PlaybackStatus> {
        let duration = clip.duration_seconds();
        let token = Arc::new(AtomicBool::new(false));
        {
            let mut state = self.lock();
            if let Some(previous) = state.cancel.replace(Arc::clone(&token)) {
                previous.store(true, Ordering::SeqCst);
            }
            state.is_playing = true;
        }

        let guard = PlayingGuard {
            state: Arc::clone(&self.state),
            token: Arc::clone(&token),
        };
        let sink = Arc::clone(&self.sink);

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            sink.play_blocking(&clip, &token)
        })
        .await
        .map_err(|e| Error::Playback(format!("playback worker failed: {e}")))??;

        Ok(PlaybackStatus::finished(duration))
    }

    /// Cancel the current clip; safe when idle
    pub fn stop(&self) {
        let mut state = self.lock();
        if let Some(cancel) = state.cancel.take() {
            cancel.store(true, Ordering::SeqCst);
            tracing::debug!("playback stop requested");
        }
        state.is_playing = false;
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.lock().is_playing
    }
}

#[async_trait]
impl AudioPlaybackPort for PlaybackDriver {
    async fn play(&self, request: PlaybackRequest) -> Result<PlaybackStatus> {
        Self::play(self, request).await
    }

    async fn stop(&self) {
        Self::stop(self);
    }

    fn is_playing(&self) -> bool {
        Self::is_playing(self)
    }

    async fn play_file(&self, path: &Path) -> Result<PlaybackStatus> {
        Self::play_file(self, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_waits_for_callback_past_the_end() {
        let samples = [0.25_f32; 6];
        let progress = Progress::default();
        let mut data = [1.0_f32; 4];

        fill_output(&mut data, &samples, &progress);
        assert_eq!(data, [0.25; 4]);
        assert!(!progress.finished.load(Ordering::Acquire));

        fill_output(&mut data, &samples, &progress);
        assert_eq!(data, [0.25, 0.25, 0.0, 0.0]);
        assert!(!progress.finished.load(Ordering::Acquire));

        fill_output(&mut data, &samples, &progress);
        assert_eq!(data, [0.0; 4]);
        assert!(progress.finished.load(Ordering::Acquire));
    }

    #[test]
    fn drain_covers_the_device_buffer() {
        assert_eq!(drain_delay(None, 48_000), MIN_DRAIN);
        assert_eq!(drain_delay(Some(480), 48_000), MIN_DRAIN);
        assert_eq!(drain_delay(Some(9_600), 48_000), Duration::from_millis(200));
    }

    fn pcm(frames: usize, channels: u16) -> Vec<u8> {
        vec![0u8; frames * usize::from(channels) * 2]
    }

    fn request(frames: usize, sample_rate: u32, channels: u16) -> PlaybackRequest {
        PlaybackRequest {
            pcm: pcm(frames, channels),
            sample_rate,
            channels,
        }
    }

    #[tokio::test]
    async fn duration_is_frames_over_rate() {
        let sink = Arc::new(NullSink::new());
        let driver = PlaybackDriver::new(sink.clone());

        let status = driver.play(request(8_000, 16_000, 2)).await.unwrap();
        assert!(!status.is_playing);
        assert_eq!(status.duration_seconds, Some(0.5));
        assert_eq!(sink.played(), 1);
        assert!(!driver.is_playing());
    }

    #[tokio::test]
    async fn malformed_pcm_is_rejected() {
        let driver = PlaybackDriver::new(Arc::new(NullSink::new()));
        let odd = PlaybackRequest {
            pcm: vec![0; 3],
            sample_rate: 16_000,
            channels: 1,
        };
        assert!(matches!(driver.play(odd).await, Err(Error::Format(_))));
        assert!(!driver.is_playing());
    }

    #[tokio::test]
    async fn stop_halts_realtime_playback() {
        let driver = Arc::new(PlaybackDriver::new(Arc::new(NullSink::realtime())));
        let task = {
            let driver = Arc::clone(&driver);
            tokio::spawn(async move { driver.play(request(160_000, 16_000, 1)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(driver.is_playing());

        let start = Instant::now();
        driver.stop();
        assert!(!driver.is_playing());

        let status = task.await.unwrap().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(status.duration_seconds, Some(10.0));
    }

    #[tokio::test]
    async fn stop_when_idle_is_noop() {
        let driver = PlaybackDriver::new(Arc::new(NullSink::new()));
        driver.stop();
        driver.stop();
        assert!(!driver.is_playing());
    }

    #[tokio::test]
    async fn play_file_checks_existence_then_extension() {
        let driver = PlaybackDriver::new(Arc::new(NullSink::new()));
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.wav");
        assert!(matches!(
            driver.play_file(&missing).await,
            Err(Error::NotFound(_))
        ));

        let text = dir.path().join("notes.txt");
        std::fs::write(&text, b"hello").unwrap();
        assert!(matches!(
            driver.play_file(&text).await,
            Err(Error::Format(_))
        ));
    }

    #[tokio::test]
    async fn play_file_reports_duration() {
        let driver = PlaybackDriver::new(Arc::new(NullSink::new()));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        std::fs::write(&path, wav::samples_to_wav(&[0.0; 22_050], 22_050).unwrap()).unwrap();

        let status = driver.play_file(&path).await.unwrap();
        assert_eq!(status.duration_seconds, Some(1.0));
    }
}
