//! JSON error responses with status codes matched to capture failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::capture::CaptureError;
use crate::controller::ControllerError;
use crate::persist::PersistError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": true,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<CaptureError> for ApiError {
    fn from(err: CaptureError) -> Self {
        let status = match &err {
            CaptureError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            CaptureError::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CaptureError::SessionAlreadyActive => StatusCode::CONFLICT,
            CaptureError::EmptyCapture => StatusCode::UNPROCESSABLE_ENTITY,
            CaptureError::Recorder(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<ControllerError> for ApiError {
    fn from(err: ControllerError) -> Self {
        let status = match &err {
            ControllerError::NothingToSave => StatusCode::CONFLICT,
            ControllerError::Persist(PersistError::UploadFailed(_)) => StatusCode::BAD_GATEWAY,
            ControllerError::Persist(PersistError::MetadataWriteFailed { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ControllerError::DownloadFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
