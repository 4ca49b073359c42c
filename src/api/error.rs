//! Mapping of service errors onto HTTP responses

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::Error;
use crate::error::ErrorKind;

/// Error returned by API handlers
#[derive(Debug)]
pub enum ApiError {
    /// Request failed validation before reaching a service
    BadRequest(String),
    /// Service-layer failure
    Service(Error),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self::Service(e)
    }
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub detail: String,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Service(e) => match e.kind() {
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
                ErrorKind::Format => (StatusCode::BAD_REQUEST, "invalid_format"),
                ErrorKind::Device => (StatusCode::SERVICE_UNAVAILABLE, "audio_device_unavailable"),
                ErrorKind::Synthesis => (StatusCode::INTERNAL_SERVER_ERROR, "synthesis_failed"),
                ErrorKind::Playback => (StatusCode::INTERNAL_SERVER_ERROR, "playback_failed"),
                ErrorKind::Other => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.parts();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error, "request failed: {}", detail(&self));
        }
        let body = ErrorResponse {
            error,
            detail: detail(&self),
        };
        (status, Json(body)).into_response()
    }
}

fn detail(e: &ApiError) -> String {
    match e {
        ApiError::BadRequest(msg) => msg.clone(),
        ApiError::Service(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: ApiError) -> StatusCode {
        e.into_response().status()
    }

    #[test]
    fn service_errors_map_to_status() {
        assert_eq!(
            status_of(Error::NotFound("voice".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(Error::Format("not wav".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(Error::Device("no output".into()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(Error::Synthesis("engine down".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ApiError::BadRequest("text too long".into())),
            StatusCode::BAD_REQUEST
        );
    }
}
