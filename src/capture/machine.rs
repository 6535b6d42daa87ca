//! Capture session lifecycle.
//!
//! One machine per recording attempt: it exclusively owns the acquired
//! bundle and the recorder, pumps chunks on a fixed interval into the
//! accumulator, and finalizes exactly once. Machines are never reused; a
//! new request builds a new machine.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::media::{MediaSourceBundle, PreviewInfo};

use super::accumulator::{ChunkAccumulator, RecordingArtifact};
use super::recorder::ChunkRecorder;
use super::state::{CapturePhase, CaptureStatusHandle};
use super::CaptureError;

/// Lifecycle notifications, observed by the service loop for
/// user-facing notices.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Started,
    Paused,
    Resumed,
    Chunk { bytes: usize },
    Stopped { size_bytes: u64 },
    Failed(String),
}

/// What `pause_or_resume` actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    Paused,
    Resumed,
    /// Called outside Recording/Paused: state unchanged, not an error.
    NoEffect(CapturePhase),
}

/// Why a session ended in Failed, kept so repeated `stop` calls report
/// the same result.
enum SessionFailure {
    Empty,
    Recorder(String),
}

pub struct CaptureMachine {
    project_id: String,
    phase: CapturePhase,
    status: CaptureStatusHandle,
    bundle: MediaSourceBundle,
    recorder: Arc<Mutex<Box<dyn ChunkRecorder>>>,
    chunks: Arc<Mutex<ChunkAccumulator>>,
    chunk_interval: Duration,
    pump: Option<JoinHandle<()>>,
    pump_stop: Option<watch::Sender<bool>>,
    events: broadcast::Sender<CaptureEvent>,
    started: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
    finished: Option<Arc<RecordingArtifact>>,
    failure: Option<SessionFailure>,
}

impl CaptureMachine {
    pub fn new(
        project_id: &str,
        bundle: MediaSourceBundle,
        recorder: Box<dyn ChunkRecorder>,
        status: CaptureStatusHandle,
        events: broadcast::Sender<CaptureEvent>,
        chunk_interval: Duration,
    ) -> Self {
        let container = recorder.container().to_string();
        Self {
            project_id: project_id.to_string(),
            phase: CapturePhase::Requesting,
            status,
            bundle,
            recorder: Arc::new(Mutex::new(recorder)),
            chunks: Arc::new(Mutex::new(ChunkAccumulator::new(container))),
            chunk_interval,
            pump: None,
            pump_stop: None,
            events,
            started: None,
            paused_at: None,
            paused_total: Duration::ZERO,
            finished: None,
            failure: None,
        }
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Live self-preview of the acquired tracks. Keeps rendering while
    /// Paused; goes dead only once the bundle is released.
    pub fn preview(&self) -> PreviewInfo {
        self.bundle.preview()
    }

    /// Start the recorder and the periodic chunk pump.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        self.recorder
            .lock()
            .await
            .start()
            .await
            .map_err(CaptureError::Recorder)?;

        self.spawn_pump();
        self.started = Some(Instant::now());
        self.phase = CapturePhase::Recording;
        self.status.recording_started().await;
        let _ = self.events.send(CaptureEvent::Started);

        info!(
            "Capture session started for project {} ({} tracks)",
            self.project_id,
            self.bundle.track_count()
        );
        Ok(())
    }

    fn spawn_pump(&mut self) {
        let recorder = self.recorder.clone();
        let chunks = self.chunks.clone();
        let status = self.status.clone();
        let events = self.events.clone();
        let interval = self.chunk_interval;
        let (stop_tx, mut stop_rx) = watch::channel(false);

        // Single pump task: appends are strictly ordered, and stopping it
        // before the recorder's final drain means finalize observes every
        // append.
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let data = recorder.lock().await.drain();
                        if data.is_empty() {
                            continue;
                        }
                        let len = data.len();
                        if chunks.lock().await.append(data) {
                            status.add_chunk(len).await;
                            let _ = events.send(CaptureEvent::Chunk { bytes: len });
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        self.pump = Some(handle);
        self.pump_stop = Some(stop_tx);
    }

    /// Tear down a session whose recorder never started. Releases the
    /// tracks and latches the failure so later queries see it.
    pub async fn abandon(&mut self, error: &CaptureError) {
        self.bundle.release();
        self.phase = CapturePhase::Failed;
        self.status.fail(error.to_string()).await;
        let _ = self.events.send(CaptureEvent::Failed(error.to_string()));
        self.failure = Some(match error {
            CaptureError::EmptyCapture => SessionFailure::Empty,
            other => SessionFailure::Recorder(other.to_string()),
        });
    }

    /// Toggle pause. Acts only when the precondition holds and reports
    /// what actually happened.
    pub async fn pause_or_resume(&mut self) -> PauseOutcome {
        match self.phase {
            CapturePhase::Recording => {
                if let Err(e) = self.recorder.lock().await.pause() {
                    warn!("Failed to suspend recorder: {}", e);
                }
                self.paused_at = Some(Instant::now());
                self.phase = CapturePhase::Paused;
                self.status.set_phase(CapturePhase::Paused).await;
                let _ = self.events.send(CaptureEvent::Paused);
                info!("Capture paused");
                PauseOutcome::Paused
            }
            CapturePhase::Paused => {
                if let Err(e) = self.recorder.lock().await.resume() {
                    warn!("Failed to resume recorder: {}", e);
                }
                if let Some(paused_at) = self.paused_at.take() {
                    self.paused_total += paused_at.elapsed();
                }
                self.phase = CapturePhase::Recording;
                self.status.set_phase(CapturePhase::Recording).await;
                let _ = self.events.send(CaptureEvent::Resumed);
                info!("Capture resumed");
                PauseOutcome::Resumed
            }
            other => PauseOutcome::NoEffect(other),
        }
    }

    /// Stop and finalize. Idempotent: once the session reached Stopped or
    /// Failed, repeated calls return the same result without touching the
    /// tracks again.
    pub async fn stop(&mut self) -> Result<Arc<RecordingArtifact>, CaptureError> {
        match self.phase {
            CapturePhase::Stopped => {
                return self
                    .finished
                    .clone()
                    .ok_or(CaptureError::EmptyCapture);
            }
            CapturePhase::Failed => return Err(self.failure_error()),
            CapturePhase::Recording | CapturePhase::Paused => {}
            other => {
                return Err(CaptureError::Recorder(anyhow::anyhow!(
                    "cannot stop a session in phase {}",
                    other.as_str()
                )));
            }
        }

        self.phase = CapturePhase::Finalizing;
        self.status.set_phase(CapturePhase::Finalizing).await;

        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += paused_at.elapsed();
        }

        // Stop the pump first so no append can race the final drain.
        if let Some(stop_tx) = self.pump_stop.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }

        // A recorder that died mid-session is not fatal: chunks already
        // accumulated can still be finalized.
        match self.recorder.lock().await.stop().await {
            Ok(tail) => {
                self.chunks.lock().await.append(tail);
            }
            Err(e) => warn!("Recorder stop failed, finalizing buffered chunks: {}", e),
        }

        let duration = self
            .started
            .map(|s| s.elapsed().saturating_sub(self.paused_total))
            .unwrap_or(Duration::ZERO);

        let result = self.chunks.lock().await.finalize(duration);

        // Tracks are released on both outcomes: orphaned live tracks show
        // up to the user as a stuck capture indicator.
        self.bundle.release();

        match result {
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                self.phase = CapturePhase::Stopped;
                self.status.set_phase(CapturePhase::Stopped).await;
                let _ = self.events.send(CaptureEvent::Stopped {
                    size_bytes: artifact.size_bytes(),
                });
                info!(
                    "Capture finalized: {} bytes, ~{}s active",
                    artifact.size_bytes(),
                    artifact.duration_hint.as_secs()
                );
                self.finished = Some(artifact.clone());
                Ok(artifact)
            }
            Err(e) => {
                self.phase = CapturePhase::Failed;
                self.status.fail(e.to_string()).await;
                let _ = self.events.send(CaptureEvent::Failed(e.to_string()));
                warn!("Capture failed during finalize: {}", e);
                self.failure = Some(match &e {
                    CaptureError::EmptyCapture => SessionFailure::Empty,
                    other => SessionFailure::Recorder(other.to_string()),
                });
                Err(e)
            }
        }
    }

    fn failure_error(&self) -> CaptureError {
        match &self.failure {
            Some(SessionFailure::Empty) | None => CaptureError::EmptyCapture,
            Some(SessionFailure::Recorder(msg)) => {
                CaptureError::Recorder(anyhow::anyhow!("{msg}"))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::media::{EncoderInput, MediaTrack, TrackKind};

    /// Track whose stop is observable from outside the machine.
    pub struct FlaggedTrack {
        kind: TrackKind,
        label: String,
        stopped: Arc<AtomicBool>,
    }

    impl FlaggedTrack {
        pub fn new(kind: TrackKind, label: &str) -> (Self, Arc<AtomicBool>) {
            let stopped = Arc::new(AtomicBool::new(false));
            (
                Self {
                    kind,
                    label: label.to_string(),
                    stopped: stopped.clone(),
                },
                stopped,
            )
        }
    }

    impl MediaTrack for FlaggedTrack {
        fn kind(&self) -> TrackKind {
            self.kind
        }
        fn label(&self) -> &str {
            &self.label
        }
        fn encoder_input(&self) -> EncoderInput {
            EncoderInput::new("fake", self.label.clone())
        }
        fn is_live(&self) -> bool {
            !self.stopped.load(Ordering::SeqCst)
        }
        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    /// Recorder that hands out scripted chunks, one per drain.
    pub struct ScriptedRecorder {
        chunks: VecDeque<Vec<u8>>,
        pub started: bool,
        pub paused: bool,
    }

    impl ScriptedRecorder {
        pub fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self {
                chunks: chunks.into(),
                started: false,
                paused: false,
            }
        }

        pub fn empty() -> Self {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl ChunkRecorder for ScriptedRecorder {
        fn container(&self) -> &str {
            "video/x-matroska"
        }

        async fn start(&mut self) -> Result<()> {
            self.started = true;
            Ok(())
        }

        fn pause(&mut self) -> Result<()> {
            self.paused = true;
            Ok(())
        }

        fn resume(&mut self) -> Result<()> {
            self.paused = false;
            Ok(())
        }

        fn drain(&mut self) -> Vec<u8> {
            if self.paused {
                return Vec::new();
            }
            self.chunks.pop_front().unwrap_or_default()
        }

        async fn stop(&mut self) -> Result<Vec<u8>> {
            let mut tail = Vec::new();
            while let Some(chunk) = self.chunks.pop_front() {
                tail.extend_from_slice(&chunk);
            }
            Ok(tail)
        }
    }
}
