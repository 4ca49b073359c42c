//! Voice model persistence port

use async_trait::async_trait;
use uuid::Uuid;

use crate::Result;
use crate::domain::VoiceModel;

/// Stores voice metadata and reference audio keyed by voice id
#[async_trait]
pub trait VoiceRepository: Send + Sync {
    /// Persist a voice with its reference audio, returning it with `file_path` set
    async fn save(&self, voice: VoiceModel, voice_data: &[u8]) -> Result<VoiceModel>;

    async fn get(&self, voice_id: Uuid) -> Result<Option<VoiceModel>>;

    /// Raw reference audio for a voice
    async fn get_data(&self, voice_id: Uuid) -> Result<Option<Vec<u8>>>;

    async fn list_all(&self) -> Result<Vec<VoiceModel>>;

    /// Returns `false` when the voice did not exist
    async fn delete(&self, voice_id: Uuid) -> Result<bool>;

    async fn exists(&self, voice_id: Uuid) -> Result<bool>;
}
