//! Saved-recording metadata endpoints.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{delete, get},
    Router,
};
use serde_json::{json, Value};

use crate::api::error::{ApiError, ApiResult};
use crate::db::{PersistedRecording, RecordingStore};

pub fn router(store: RecordingStore) -> Router {
    Router::new()
        .route("/:project_id", get(list_recordings))
        .route("/id/:id", delete(delete_recording))
        .with_state(store)
}

/// GET /recordings/:project_id - a project's recordings, newest first.
async fn list_recordings(
    Path(project_id): Path<String>,
    State(store): State<RecordingStore>,
) -> ApiResult<Json<Vec<PersistedRecording>>> {
    let recordings = store.list(&project_id).map_err(ApiError::from)?;
    Ok(Json(recordings))
}

/// DELETE /recordings/id/:id - remove a metadata row. The uploaded bytes
/// stay in storage; only the pointer is dropped.
async fn delete_recording(
    Path(id): Path<String>,
    State(store): State<RecordingStore>,
) -> ApiResult<Json<Value>> {
    let deleted = store.delete(&id).map_err(ApiError::from)?;
    if !deleted {
        return Err(ApiError::not_found(format!("Recording {} not found", id)));
    }
    Ok(Json(json!({ "success": true })))
}
