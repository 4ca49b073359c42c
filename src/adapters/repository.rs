//! File-backed voice repository
//!
//! Layout:
//!
//! ```text
//! voices_dir/
//!     metadata.json      index of all voices keyed by id
//!     {uuid}.voice       reference audio
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::VoiceModel;
use crate::ports::VoiceRepository;
use crate::{Error, Result};

const METADATA_FILE: &str = "metadata.json";
const VOICE_EXTENSION: &str = "voice";

type Index = BTreeMap<String, VoiceModel>;

/// Stores voices as individual files with a JSON metadata index
pub struct FileVoiceRepository {
    voices_dir: PathBuf,
    metadata_path: PathBuf,
    // Serializes read-modify-write cycles on the index
    write_lock: Mutex<()>,
}

impl FileVoiceRepository {
    /// Open a repository, creating the directory and an empty index if needed
    ///
    /// # Errors
    ///
    /// Returns `Error::Repository` if the directory or index cannot be created
    pub fn new(voices_dir: impl Into<PathBuf>) -> Result<Self> {
        let voices_dir = voices_dir.into();
        std::fs::create_dir_all(&voices_dir).map_err(|e| {
            Error::Repository(format!(
                "failed to create voices dir {}: {e}",
                voices_dir.display()
            ))
        })?;

        let metadata_path = voices_dir.join(METADATA_FILE);
        if !metadata_path.exists() {
            std::fs::write(&metadata_path, b"{}").map_err(|e| {
                Error::Repository(format!("failed to create voice index: {e}"))
            })?;
        }

        tracing::debug!(dir = %voices_dir.display(), "voice repository opened");
        Ok(Self {
            voices_dir,
            metadata_path,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn voices_dir(&self) -> &Path {
        &self.voices_dir
    }

    fn voice_file_path(&self, id: Uuid) -> PathBuf {
        self.voices_dir.join(format!("{id}.{VOICE_EXTENSION}"))
    }

    async fn read_index(&self) -> Result<Index> {
        let content = tokio::fs::read(&self.metadata_path).await.map_err(|e| {
            Error::Repository(format!("failed to read voice index: {e}"))
        })?;
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Index::new());
        }
        Ok(serde_json::from_slice(&content)?)
    }

    async fn write_index(&self, index: &Index) -> Result<()> {
        let json = serde_json::to_vec_pretty(index)?;
        let tmp = self.metadata_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.metadata_path).await?;
        Ok(())
    }
}

#[async_trait]
impl VoiceRepository for FileVoiceRepository {
    async fn save(&self, mut voice: VoiceModel, voice_data: &[u8]) -> Result<VoiceModel> {
        let _guard = self.write_lock.lock().await;

        let path = self.voice_file_path(voice.id);
        tokio::fs::write(&path, voice_data).await.map_err(|e| {
            Error::Repository(format!("failed to write {}: {e}", path.display()))
        })?;
        voice.file_path = Some(path);

        let mut index = self.read_index().await?;
        index.insert(voice.id.to_string(), voice.clone());
        self.write_index(&index).await?;

        tracing::debug!(id = %voice.id, bytes = voice_data.len(), "voice saved");
        Ok(voice)
    }

    async fn get(&self, voice_id: Uuid) -> Result<Option<VoiceModel>> {
        Ok(self.read_index().await?.remove(&voice_id.to_string()))
    }

    async fn get_data(&self, voice_id: Uuid) -> Result<Option<Vec<u8>>> {
        let path = self.voice_file_path(voice_id);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_all(&self) -> Result<Vec<VoiceModel>> {
        let mut voices: Vec<VoiceModel> = self.read_index().await?.into_values().collect();
        voices.sort_by_key(|v| v.created_at);
        Ok(voices)
    }

    async fn delete(&self, voice_id: Uuid) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let mut index = self.read_index().await?;
        if index.remove(&voice_id.to_string()).is_none() {
            return Ok(false);
        }
        self.write_index(&index).await?;

        let path = self.voice_file_path(voice_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove voice file");
            }
        }
        Ok(true)
    }

    async fn exists(&self, voice_id: Uuid) -> Result<bool> {
        Ok(self.read_index().await?.contains_key(&voice_id.to_string()))
    }
}
