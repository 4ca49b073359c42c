//! Domain services built on the capability ports

mod clone;
mod playback;
mod synth_play;
mod tts;

pub use clone::CloneSpeechService;
pub use playback::AudioPlaybackService;
pub use synth_play::{StateObserver, SynthPlayService};
pub use tts::TextToSpeechService;
