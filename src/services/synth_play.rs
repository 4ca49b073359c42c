//! Synthesize-then-play orchestration
//!
//! One call walks `Synthesizing -> Playing -> Completed`, or jumps to `Error`
//! from any step. There are no retries: the first failure ends the call and
//! is returned unchanged after the `Error` notification, whose message is
//! prefixed with the state that failed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{
    PlaybackRequest, PlaybackStatus, StateChange, SynthPlayState, TtsRequest, VoiceModel,
};
use crate::ports::{AudioPlaybackPort, TtsEngine};
use crate::{Error, Result};

/// Characters of the input text echoed in the `Synthesizing` message
const PREVIEW_CHARS: usize = 50;

/// Receives state transitions of a synthesize-and-play call
///
/// Notification is best-effort: a failing observer is logged and otherwise
/// ignored.
#[async_trait]
pub trait StateObserver: Send + Sync {
    /// Handle one transition
    ///
    /// # Errors
    ///
    /// Returns an error if the transition could not be delivered
    async fn on_state_change(&self, change: StateChange) -> Result<()>;
}

#[async_trait]
impl StateObserver for mpsc::Sender<StateChange> {
    async fn on_state_change(&self, change: StateChange) -> Result<()> {
        self.send(change)
            .await
            .map_err(|e| Error::ChannelClosed(format!("state observer dropped {:?}", e.0.state)))
    }
}

/// Sequences synthesis and playback as one observable operation
pub struct SynthPlayService {
    tts: Arc<dyn TtsEngine>,
    audio: Arc<dyn AudioPlaybackPort>,
    speed: f32,
}

impl SynthPlayService {
    #[must_use]
    pub fn new(tts: Arc<dyn TtsEngine>, audio: Arc<dyn AudioPlaybackPort>) -> Self {
        Self {
            tts,
            audio,
            speed: 1.0,
        }
    }

    /// Speak at `speed` instead of the engine's normal rate
    #[must_use]
    pub const fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    /// Synthesize `text` and play it on the host, reporting each transition
    ///
    /// Resolves once playback has finished.
    ///
    /// # Errors
    ///
    /// Returns `Error::Format` for empty text, or the engine's or playback
    /// port's error unchanged
    pub async fn synthesize_and_play(
        &self,
        text: &str,
        language: &str,
        voice: Option<&VoiceModel>,
        observer: Option<&dyn StateObserver>,
    ) -> Result<PlaybackStatus> {
        let preview: String = text.chars().take(PREVIEW_CHARS).collect();
        notify(
            observer,
            SynthPlayState::Synthesizing,
            Some(format!("Synthesizing: {preview}...")),
            None,
        )
        .await;

        let mut state = SynthPlayState::Synthesizing;
        match self.run(text, language, voice, observer, &mut state).await {
            Ok(status) => {
                notify(
                    observer,
                    SynthPlayState::Completed,
                    Some("Playback complete".to_string()),
                    status.duration_seconds,
                )
                .await;
                Ok(status)
            }
            Err(e) => {
                tracing::warn!(state = state.as_str(), error = %e, "synthesize and play failed");
                let message = format!("{}: {e}", state.as_str());
                notify(observer, SynthPlayState::Error, Some(message), None).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        text: &str,
        language: &str,
        voice: Option<&VoiceModel>,
        observer: Option<&dyn StateObserver>,
        state: &mut SynthPlayState,
    ) -> Result<PlaybackStatus> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Format("text is empty".to_string()));
        }

        let request = TtsRequest {
            voice_id: voice.map(|v| v.id),
            language: language.to_string(),
            speed: self.speed,
            ..TtsRequest::new(text)
        };
        let response = self.tts.synthesize(&request, voice).await?;
        tracing::debug!(
            chars = text.chars().count(),
            sample_rate = response.sample_rate,
            duration = response.duration_seconds,
            "speech synthesized"
        );

        *state = SynthPlayState::Playing;
        notify(
            observer,
            SynthPlayState::Playing,
            Some("Playing audio...".to_string()),
            None,
        )
        .await;

        let status = self
            .audio
            .play(PlaybackRequest {
                pcm: response.pcm,
                sample_rate: response.sample_rate,
                channels: response.channels,
            })
            .await?;

        Ok(PlaybackStatus {
            is_playing: false,
            duration_seconds: status.duration_seconds,
        })
    }
}

async fn notify(
    observer: Option<&dyn StateObserver>,
    state: SynthPlayState,
    message: Option<String>,
    duration_seconds: Option<f64>,
) {
    let Some(observer) = observer else {
        return;
    };
    let change = StateChange {
        state,
        message,
        duration_seconds,
    };
    if let Err(e) = observer.on_state_change(change).await {
        tracing::debug!(state = state.as_str(), error = %e, "state observer failed");
    }
}
