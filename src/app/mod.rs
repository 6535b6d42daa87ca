//! Service wiring and the command loop.
//!
//! The controller owns media tracks that are not `Send`, so it never
//! leaves this task. API handlers reach it through the command channel.

use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::api::{ApiServer, ControllerCommand};
use crate::capture::{CaptureEvent, EncoderRecorderBuilder};
use crate::config::Config;
use crate::controller::RecordingController;
use crate::db::{BoardStateStore, Database, RecordingStore};
use crate::media::DeviceAcquirer;
use crate::persist::{ArtifactPersister, EncoderShrink, HttpStorage};

pub async fn run_service() -> Result<()> {
    info!("Starting boardcast service");

    let config = Config::load()?;

    let db = Database::open_default()?;
    let recordings = RecordingStore::new(db.clone());
    let boards = BoardStateStore::new(db);

    let mut persister = ArtifactPersister::new(
        Box::new(HttpStorage::new(&config.storage)),
        recordings.clone(),
    );
    if config.behavior.shrink_before_upload {
        persister = persister.with_shrink(Box::new(EncoderShrink::new(&config.capture.encoder)));
    }

    let mut controller = RecordingController::new(
        Box::new(DeviceAcquirer::new(config.capture.clone())),
        Box::new(EncoderRecorderBuilder::new(config.capture.clone())),
        persister,
        Duration::from_millis(config.capture.chunk_interval_ms),
        config.download_dir()?,
    );

    let (tx, mut rx) = mpsc::channel::<ControllerCommand>(10);

    let api_server = ApiServer::new(
        tx,
        controller.status_handle(),
        recordings,
        boards,
        &config,
    );
    tokio::spawn(async move {
        if let Err(e) = api_server.start().await {
            error!("API server failed: {}", e);
        }
    });

    spawn_event_logger(controller.subscribe());

    info!("boardcast is ready!");
    info!(
        "Start a session with: curl -X POST http://127.0.0.1:{}/recording/start -H 'Content-Type: application/json' -d '{{\"project_id\": \"demo\"}}'",
        config.server.port
    );

    while let Some(command) = rx.recv().await {
        match command {
            ControllerCommand::Start { project_id, reply } => {
                let result = controller.start(&project_id).await;
                if let Err(e) = &result {
                    error!("Failed to start recording: {}", e);
                }
                let _ = reply.send(result);
            }
            ControllerCommand::PauseResume { reply } => {
                let _ = reply.send(controller.pause_or_resume().await);
            }
            ControllerCommand::Stop { reply } => {
                let result = controller.stop().await;
                if let Err(e) = &result {
                    error!("Failed to stop recording: {}", e);
                }
                let _ = reply.send(result);
            }
            ControllerCommand::Save { name, reply } => {
                let result = controller.save(&name).await;
                if let Err(e) = &result {
                    error!("Failed to save recording: {}", e);
                }
                let _ = reply.send(result);
            }
            ControllerCommand::Download { reply } => {
                let result = controller.download().await;
                if let Err(e) = &result {
                    error!("Failed to write local copy: {}", e);
                }
                let _ = reply.send(result);
            }
            ControllerCommand::Preview { reply } => {
                let _ = reply.send(controller.preview());
            }
        }
    }

    Ok(())
}

/// Session notices for the service log, one subscriber alongside any API
/// consumers.
fn spawn_event_logger(mut events: tokio::sync::broadcast::Receiver<CaptureEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CaptureEvent::Started) => info!("Recording started"),
                Ok(CaptureEvent::Paused) => info!("Recording paused"),
                Ok(CaptureEvent::Resumed) => info!("Recording resumed"),
                Ok(CaptureEvent::Chunk { .. }) => {}
                Ok(CaptureEvent::Stopped { size_bytes }) => {
                    info!("Recording stopped ({} bytes captured)", size_bytes);
                }
                Ok(CaptureEvent::Failed(message)) => warn!("Recording failed: {}", message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event logger lagged, skipped {} events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
