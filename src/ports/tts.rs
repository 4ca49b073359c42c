//! Text-to-speech engine port

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::Result;
use crate::audio::wav::pcm_to_wav;
use crate::domain::{CloneRequest, TtsRequest, TtsResponse, VoiceModel};

/// Size of each chunk yielded by [`TtsEngine::synthesize_stream`]
pub const STREAM_CHUNK_SIZE: usize = 4096;

/// Lazily produced WAV byte chunks
pub type AudioChunkStream = BoxStream<'static, Result<Vec<u8>>>;

/// Opaque speech synthesis capability
///
/// text + language + optional reference voice in, PCM + sample rate out.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Synthesize speech from text
    async fn synthesize(&self, request: &TtsRequest, voice: Option<&VoiceModel>)
    -> Result<TtsResponse>;

    /// Stream synthesized speech as WAV chunks
    ///
    /// The default implementation synthesizes the full utterance and slices
    /// the encoded WAV into [`STREAM_CHUNK_SIZE`] pieces.
    async fn synthesize_stream(
        &self,
        request: &TtsRequest,
        voice: Option<&VoiceModel>,
    ) -> Result<AudioChunkStream> {
        let response = self.synthesize(request, voice).await?;
        let wav = pcm_to_wav(&response.pcm, response.sample_rate, response.channels)?;
        let chunks: Vec<Vec<u8>> = wav.chunks(STREAM_CHUNK_SIZE).map(<[u8]>::to_vec).collect();
        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    /// Build a voice model from reference samples (persistence is the repository's job)
    async fn clone_voice(&self, request: CloneRequest) -> Result<VoiceModel>;

    /// Built-in voice names
    async fn available_voices(&self) -> Result<Vec<String>>;

    /// Supported language codes
    async fn supported_languages(&self) -> Result<Vec<String>>;
}
