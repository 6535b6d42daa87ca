//! Board snapshot endpoints. Documents are stored opaquely.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};

use crate::api::error::{ApiError, ApiResult};
use crate::db::{BoardState, BoardStateStore};

pub fn router(store: BoardStateStore) -> Router {
    Router::new()
        .route("/:project_id", get(latest_board).put(save_board))
        .with_state(store)
}

/// PUT /boards/:project_id - append a board snapshot.
async fn save_board(
    Path(project_id): Path<String>,
    State(store): State<BoardStateStore>,
    Json(document): Json<Value>,
) -> ApiResult<Json<Value>> {
    let id = store.save(&project_id, &document).map_err(ApiError::from)?;
    Ok(Json(json!({ "success": true, "id": id })))
}

/// GET /boards/:project_id - latest snapshot for a project.
async fn latest_board(
    Path(project_id): Path<String>,
    State(store): State<BoardStateStore>,
) -> ApiResult<Json<BoardState>> {
    let state = store
        .latest(&project_id)
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("No board state for {}", project_id)))?;
    Ok(Json(state))
}
