//! Recording control endpoints.
//!
//! The controller lives on the service task because its media tracks are
//! not `Send`; handlers talk to it through commands with reply channels.

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::capture::{CaptureError, CaptureStatusHandle, PauseOutcome, RecordingArtifact};
use crate::controller::ControllerError;
use crate::db::PersistedRecording;
use crate::media::PreviewInfo;

/// Commands the service loop executes against the controller.
pub enum ControllerCommand {
    Start {
        project_id: String,
        reply: oneshot::Sender<Result<(), CaptureError>>,
    },
    PauseResume {
        reply: oneshot::Sender<PauseOutcome>,
    },
    Stop {
        reply: oneshot::Sender<Result<Arc<RecordingArtifact>, CaptureError>>,
    },
    Save {
        name: String,
        reply: oneshot::Sender<Result<PersistedRecording, ControllerError>>,
    },
    Download {
        reply: oneshot::Sender<Result<PathBuf, ControllerError>>,
    },
    Preview {
        reply: oneshot::Sender<Option<PreviewInfo>>,
    },
}

#[derive(Clone)]
pub struct ControlState {
    pub tx: mpsc::Sender<ControllerCommand>,
    pub status: CaptureStatusHandle,
}

impl ControlState {
    /// Send a command and wait for the service loop's reply.
    async fn dispatch<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ControllerCommand,
    ) -> Result<T, ApiError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| ApiError::internal("recording service is not running"))?;
        reply_rx
            .await
            .map_err(|_| ApiError::internal("recording service dropped the request"))
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct StartRequest {
    pub project_id: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct SaveRequest {
    pub name: String,
}

pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/start", post(start_recording))
        .route("/pause", post(pause_recording))
        .route("/stop", post(stop_recording))
        .route("/save", post(save_recording))
        .route("/download", post(download_recording))
        .route("/status", get(recording_status))
        .route("/preview", get(recording_preview))
        .with_state(state)
}

/// POST /recording/start - begin a capture session for a project.
async fn start_recording(
    State(state): State<ControlState>,
    Json(req): Json<StartRequest>,
) -> ApiResult<Json<Value>> {
    if req.project_id.trim().is_empty() {
        return Err(ApiError::bad_request("project_id must not be empty"));
    }

    info!("Start recording requested for project {}", req.project_id);
    state
        .dispatch(|reply| ControllerCommand::Start {
            project_id: req.project_id.clone(),
            reply,
        })
        .await??;

    let status = state.status.get().await;
    Ok(Json(json!({
        "success": true,
        "phase": status.phase.as_str(),
        "project_id": status.project_id,
    })))
}

/// POST /recording/pause - toggle pause on the active session.
async fn pause_recording(State(state): State<ControlState>) -> ApiResult<Json<Value>> {
    let outcome = state
        .dispatch(|reply| ControllerCommand::PauseResume { reply })
        .await?;

    let action = match outcome {
        PauseOutcome::Paused => "paused",
        PauseOutcome::Resumed => "resumed",
        PauseOutcome::NoEffect(phase) => {
            return Ok(Json(json!({
                "success": true,
                "action": "none",
                "phase": phase.as_str(),
            })));
        }
    };

    Ok(Json(json!({ "success": true, "action": action })))
}

/// POST /recording/stop - finalize the active session.
async fn stop_recording(State(state): State<ControlState>) -> ApiResult<Json<Value>> {
    let artifact = state
        .dispatch(|reply| ControllerCommand::Stop { reply })
        .await??;

    Ok(Json(json!({
        "success": true,
        "size_bytes": artifact.size_bytes(),
        "duration_seconds": artifact.duration_hint.as_secs(),
        "content_type": artifact.content_type,
    })))
}

/// POST /recording/save - upload the finished artifact and record it.
async fn save_recording(
    State(state): State<ControlState>,
    Json(req): Json<SaveRequest>,
) -> ApiResult<Json<PersistedRecording>> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }

    let record = state
        .dispatch(|reply| ControllerCommand::Save {
            name: req.name.clone(),
            reply,
        })
        .await??;

    Ok(Json(record))
}

/// POST /recording/download - write a local copy of the finished artifact.
async fn download_recording(State(state): State<ControlState>) -> ApiResult<Json<Value>> {
    let path = state
        .dispatch(|reply| ControllerCommand::Download { reply })
        .await??;

    Ok(Json(json!({
        "success": true,
        "path": path.display().to_string(),
    })))
}

/// GET /recording/status - current session state and counters.
async fn recording_status(State(state): State<ControlState>) -> Json<Value> {
    let status = state.status.get().await;
    Json(json!({
        "phase": status.phase.as_str(),
        "project_id": status.project_id,
        "chunk_count": status.chunk_count,
        "captured_bytes": status.captured_bytes,
        "elapsed_seconds": status.elapsed_seconds(),
        "last_error": status.last_error,
    }))
}

/// GET /recording/preview - track summary of the active session.
async fn recording_preview(State(state): State<ControlState>) -> ApiResult<Json<Value>> {
    let preview = state
        .dispatch(|reply| ControllerCommand::Preview { reply })
        .await?;

    match preview {
        Some(preview) => Ok(Json(json!({ "active": true, "preview": preview }))),
        None => Ok(Json(json!({ "active": false }))),
    }
}
