//! Audio capture and playback pipeline

pub mod capture;
pub mod device;
pub mod hub;
pub mod playback;
pub mod queue;
pub mod wav;

pub use capture::{CaptureBackend, CpalCaptureBackend, ManualCaptureBackend, ManualFeed};
pub use hub::{AudioCaptureHub, AudioStreamReader};
pub use playback::{AudioSink, CpalSink, NullSink, PlaybackDriver};
pub use queue::{DEFAULT_MAX_FRAMES, DropPolicy, FrameQueue};
pub use wav::AudioClip;
