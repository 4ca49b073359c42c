//! Voice cloning endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{ApiError, ApiState};
use crate::Error;
use crate::domain::{CloneRequest, DEFAULT_LANGUAGE, VoiceModel};

const MAX_NAME_CHARS: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 500;

/// Build voices router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(list_voices))
        .route("/clone", post(clone_voice))
        .route("/{id}", get(get_voice).delete(delete_voice))
        .with_state(state)
}

/// Voice as exposed to clients
///
/// The stored file path stays server-side.
#[derive(Debug, Serialize)]
pub struct VoiceResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl From<VoiceModel> for VoiceResponse {
    fn from(v: VoiceModel) -> Self {
        Self {
            id: v.id,
            name: v.name,
            description: v.description,
            language: v.language,
            created_at: v.created_at,
            metadata: v.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VoiceListResponse {
    pub voices: Vec<VoiceResponse>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteVoiceResponse {
    pub success: bool,
    pub message: String,
}

/// Clone a voice from uploaded samples
async fn clone_voice(
    State(state): State<Arc<ApiState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<VoiceResponse>), ApiError> {
    let mut name = None;
    let mut description = String::new();
    let mut language = DEFAULT_LANGUAGE.to_string();
    let mut audio_samples = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => name = Some(text(field).await?),
            "description" => description = text(field).await?,
            "language" => language = text(field).await?,
            "audio_files" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read audio file: {e}")))?;
                audio_samples.push(data.to_vec());
            }
            other => tracing::debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    let name = name.ok_or_else(|| ApiError::BadRequest("name is required".to_string()))?;
    let name_chars = name.chars().count();
    if name_chars == 0 || name_chars > MAX_NAME_CHARS {
        return Err(ApiError::BadRequest(format!(
            "name must be between 1 and {MAX_NAME_CHARS} characters"
        )));
    }
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(ApiError::BadRequest(format!(
            "description must be at most {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    if audio_samples.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one audio file is required".to_string(),
        ));
    }

    let voice = state
        .voices
        .clone_voice(CloneRequest {
            name,
            audio_samples,
            description,
            language,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(voice.into())))
}

async fn text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid form field: {e}")))
}

/// List stored voices
async fn list_voices(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<VoiceListResponse>, ApiError> {
    let voices: Vec<VoiceResponse> = state
        .voices
        .list_voices()
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(VoiceListResponse {
        count: voices.len(),
        voices,
    }))
}

/// Get one stored voice
async fn get_voice(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<VoiceResponse>, ApiError> {
    let voice = state
        .voices
        .get_voice(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("voice with id {id} not found")))?;
    Ok(Json(voice.into()))
}

/// Delete a stored voice
async fn delete_voice(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteVoiceResponse>, ApiError> {
    if !state.voices.delete_voice(id).await? {
        return Err(Error::NotFound(format!("voice with id {id} not found")).into());
    }

    Ok(Json(DeleteVoiceResponse {
        success: true,
        message: format!("voice {id} deleted"),
    }))
}
