//! REST API server for boardcast.
//!
//! Provides HTTP endpoints for:
//! - Recording control (start, pause, stop, save, download, status, preview)
//! - Saved-recording metadata
//! - Board snapshots

pub mod error;
pub mod routes;

use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tracing::info;

use crate::capture::CaptureStatusHandle;
use crate::config::Config;
use crate::db::{BoardStateStore, RecordingStore};

pub use routes::recording::{ControlState, ControllerCommand};

pub struct ApiServer {
    port: u16,
    control: ControlState,
    recordings: RecordingStore,
    boards: BoardStateStore,
}

impl ApiServer {
    pub fn new(
        tx: tokio::sync::mpsc::Sender<ControllerCommand>,
        status: CaptureStatusHandle,
        recordings: RecordingStore,
        boards: BoardStateStore,
        config: &Config,
    ) -> Self {
        Self {
            port: config.server.port,
            control: ControlState { tx, status },
            recordings,
            boards,
        }
    }

    pub async fn start(self) -> Result<()> {
        let app = Router::new()
            .route("/", get(status))
            .route("/version", get(version))
            .nest("/recording", routes::recording::router(self.control))
            .nest("/recordings", routes::recordings::router(self.recordings))
            .nest("/boards", routes::board::router(self.boards))
            .layer(ServiceBuilder::new());

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  POST /recording/start      - Start a capture session");
        info!("  POST /recording/pause      - Toggle pause");
        info!("  POST /recording/stop       - Stop and finalize");
        info!("  POST /recording/save       - Upload and record metadata");
        info!("  POST /recording/download   - Write a local copy");
        info!("  GET  /recording/status     - Session status");
        info!("  GET  /recording/preview    - Active track summary");
        info!("  GET  /recordings/:project  - List saved recordings");
        info!("  DELETE /recordings/id/:id  - Delete a metadata row");
        info!("  PUT  /boards/:project      - Save a board snapshot");
        info!("  GET  /boards/:project      - Latest board snapshot");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "boardcast",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "boardcast"
    }))
}
