//! Session orchestration: one controller owns at most one active capture
//! session and the handoff from a finished artifact to persistence or a
//! local download.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::capture::{
    CaptureError, CaptureEvent, CaptureMachine, CapturePhase, CaptureStatusHandle, PauseOutcome,
    RecorderBuilder, RecordingArtifact,
};
use crate::db::PersistedRecording;
use crate::media::{PreviewInfo, SourceAcquirer};
use crate::persist::{ArtifactPersister, PersistError};

/// Failures of the post-capture paths (save, download).
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("no finished recording available")]
    NothingToSave,

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("could not write local copy: {0}")]
    DownloadFailed(#[source] anyhow::Error),
}

pub struct RecordingController {
    acquirer: Box<dyn SourceAcquirer>,
    builder: Box<dyn RecorderBuilder>,
    persister: ArtifactPersister,
    status: CaptureStatusHandle,
    events: broadcast::Sender<CaptureEvent>,
    chunk_interval: Duration,
    download_dir: PathBuf,
    /// Kept after stop so repeated stop calls stay idempotent; replaced on
    /// the next start.
    active: Option<CaptureMachine>,
    /// Most recent finished artifact with its project, for save/download.
    last: Option<(String, Arc<RecordingArtifact>)>,
}

impl RecordingController {
    pub fn new(
        acquirer: Box<dyn SourceAcquirer>,
        builder: Box<dyn RecorderBuilder>,
        persister: ArtifactPersister,
        chunk_interval: Duration,
        download_dir: PathBuf,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            acquirer,
            builder,
            persister,
            status: CaptureStatusHandle::default(),
            events,
            chunk_interval,
            download_dir,
            active: None,
            last: None,
        }
    }

    /// Shared status handle, cloneable into API handlers.
    pub fn status_handle(&self) -> CaptureStatusHandle {
        self.status.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    /// Begin a new session. Exactly one session may hold resources at a
    /// time; a second start while one is active is rejected without
    /// touching the running session.
    pub async fn start(&mut self, project_id: &str) -> Result<(), CaptureError> {
        if let Some(active) = &self.active {
            if active.phase().is_active() {
                warn!(
                    "Rejecting start for project {}: session for {} still active",
                    project_id,
                    active.project_id()
                );
                return Err(CaptureError::SessionAlreadyActive);
            }
        }

        self.status.begin(project_id).await;

        let mut bundle = match self.acquirer.acquire() {
            Ok(bundle) => bundle,
            Err(e) => {
                // The acquirer already released anything it had granted.
                self.status.fail(e.to_string()).await;
                let _ = self.events.send(CaptureEvent::Failed(e.to_string()));
                return Err(e);
            }
        };

        let recorder = match self.builder.build(&bundle) {
            Ok(recorder) => recorder,
            Err(e) => {
                bundle.release();
                let error = CaptureError::Recorder(e);
                self.status.fail(error.to_string()).await;
                let _ = self.events.send(CaptureEvent::Failed(error.to_string()));
                return Err(error);
            }
        };

        let mut machine = CaptureMachine::new(
            project_id,
            bundle,
            recorder,
            self.status.clone(),
            self.events.clone(),
            self.chunk_interval,
        );

        if let Err(e) = machine.start().await {
            machine.abandon(&e).await;
            self.active = Some(machine);
            return Err(e);
        }

        self.active = Some(machine);
        Ok(())
    }

    /// Toggle pause on the active session. Without one this is a no-op.
    pub async fn pause_or_resume(&mut self) -> PauseOutcome {
        match &mut self.active {
            Some(machine) => machine.pause_or_resume().await,
            None => PauseOutcome::NoEffect(CapturePhase::Idle),
        }
    }

    /// Stop the active session and keep its artifact for save/download.
    pub async fn stop(&mut self) -> Result<Arc<RecordingArtifact>, CaptureError> {
        let machine = self.active.as_mut().ok_or_else(|| {
            CaptureError::Recorder(anyhow::anyhow!("no capture session to stop"))
        })?;

        let artifact = machine.stop().await?;
        self.last = Some((machine.project_id().to_string(), artifact.clone()));
        Ok(artifact)
    }

    /// Upload the last finished artifact and record its metadata.
    pub async fn save(&self, name: &str) -> Result<PersistedRecording, ControllerError> {
        let (project_id, artifact) = self.last.as_ref().ok_or(ControllerError::NothingToSave)?;
        let record = self.persister.persist(artifact, project_id, name).await?;
        Ok(record)
    }

    /// Write the last finished artifact to the download directory. The
    /// fallback when upload keeps failing; never creates a metadata row.
    pub async fn download(&self) -> Result<PathBuf, ControllerError> {
        let (project_id, artifact) = self.last.as_ref().ok_or(ControllerError::NothingToSave)?;

        let filename = format!(
            "{}-{}.{}",
            project_id,
            chrono::Local::now().format("%Y%m%d-%H%M%S"),
            artifact.extension()
        );
        let path = self.download_dir.join(filename);

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|e| ControllerError::DownloadFailed(e.into()))?;
        tokio::fs::write(&path, &artifact.bytes)
            .await
            .map_err(|e| ControllerError::DownloadFailed(e.into()))?;

        info!("Saved local copy: {}", path.display());
        Ok(path)
    }

    /// Self-preview of the active session's tracks.
    pub fn preview(&self) -> Option<PreviewInfo> {
        self.active.as_ref().map(|machine| machine.preview())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::machine::test_support::{FlaggedTrack, ScriptedRecorder};
    use crate::capture::ChunkRecorder;
    use crate::db::{Database, RecordingStore};
    use crate::media::{combine_grants, MediaSourceBundle, MediaTrack, TrackKind};
    use crate::persist::StorageBackend;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Acquirer with a queue of scripted outcomes, one per attempt. An
    /// exhausted queue keeps granting.
    struct ScriptedAcquirer {
        outcomes: VecDeque<Result<(), CaptureError>>,
        flags: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
    }

    impl ScriptedAcquirer {
        fn new(
            outcomes: Vec<Result<(), CaptureError>>,
        ) -> (Self, Arc<Mutex<Vec<Arc<AtomicBool>>>>) {
            let flags = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    outcomes: outcomes.into(),
                    flags: flags.clone(),
                },
                flags,
            )
        }

        fn granting() -> (Self, Arc<Mutex<Vec<Arc<AtomicBool>>>>) {
            Self::new(Vec::new())
        }
    }

    impl SourceAcquirer for ScriptedAcquirer {
        fn acquire(&mut self) -> Result<MediaSourceBundle, CaptureError> {
            match self.outcomes.pop_front() {
                Some(Ok(_)) | None => {
                    let (video, video_flag) = FlaggedTrack::new(TrackKind::Video, "screen");
                    let (loopback, loopback_flag) = FlaggedTrack::new(TrackKind::Audio, "loopback");
                    let (mic, mic_flag) = FlaggedTrack::new(TrackKind::Audio, "mic");
                    self.flags
                        .lock()
                        .unwrap()
                        .extend([video_flag, loopback_flag, mic_flag]);

                    let display: Vec<Box<dyn MediaTrack>> =
                        vec![Box::new(video), Box::new(loopback)];
                    let mic_grant: Vec<Box<dyn MediaTrack>> = vec![Box::new(mic)];
                    combine_grants(display, mic_grant)
                }
                Some(Err(e)) => Err(e),
            }
        }
    }

    /// Builder handing out pre-scripted recorders, one per session.
    struct ScriptedBuilder {
        recorders: Mutex<VecDeque<ScriptedRecorder>>,
    }

    impl ScriptedBuilder {
        fn new(recorders: Vec<ScriptedRecorder>) -> Self {
            Self {
                recorders: Mutex::new(recorders.into()),
            }
        }
    }

    impl RecorderBuilder for ScriptedBuilder {
        fn build(&self, _bundle: &MediaSourceBundle) -> Result<Box<dyn ChunkRecorder>> {
            let recorder = self
                .recorders
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(ScriptedRecorder::empty);
            Ok(Box::new(recorder))
        }
    }

    struct SinkStorage {
        uploads: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl StorageBackend for SinkStorage {
        async fn upload(&self, path: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<()> {
            if self.fail {
                anyhow::bail!("storage unreachable");
            }
            self.uploads.lock().unwrap().push(path.to_string());
            Ok(())
        }

        fn public_url(&self, path: &str) -> String {
            format!("https://store.test/{path}")
        }
    }

    struct Harness {
        controller: RecordingController,
        flags: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
        uploads: Arc<Mutex<Vec<String>>>,
        store: RecordingStore,
        _db: Database,
        _dir: tempfile::TempDir,
    }

    fn harness(
        acquirer: ScriptedAcquirer,
        flags: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
        recorders: Vec<ScriptedRecorder>,
        fail_upload: bool,
    ) -> Harness {
        let db = Database::in_memory().unwrap();
        let store = RecordingStore::new(db.clone());
        let uploads = Arc::new(Mutex::new(Vec::new()));
        let persister = ArtifactPersister::new(
            Box::new(SinkStorage {
                uploads: uploads.clone(),
                fail: fail_upload,
            }),
            store.clone(),
        );
        let dir = tempfile::tempdir().unwrap();
        let controller = RecordingController::new(
            Box::new(acquirer),
            Box::new(ScriptedBuilder::new(recorders)),
            persister,
            Duration::from_millis(5),
            dir.path().to_path_buf(),
        );
        Harness {
            controller,
            flags,
            uploads,
            store,
            _db: db,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_record_stop_save_happy_path() {
        let (acquirer, flags) = ScriptedAcquirer::granting();
        let recorder = ScriptedRecorder::new(vec![vec![1; 1000], vec![2; 1000], vec![3; 500]]);
        let mut h = harness(acquirer, flags, vec![recorder], false);

        h.controller.start("project-1").await.unwrap();
        assert!(h.controller.preview().unwrap().live);
        tokio::time::sleep(Duration::from_millis(40)).await;

        let artifact = h.controller.stop().await.unwrap();
        assert_eq!(artifact.size_bytes(), 2500);
        assert!(h.flags.lock().unwrap().iter().all(|f| f.load(Ordering::SeqCst)));

        let record = h.controller.save("first take").await.unwrap();
        assert_eq!(record.project_id, "project-1");
        assert_eq!(h.uploads.lock().unwrap().len(), 1);
        assert_eq!(h.store.list("project-1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_acquisition_failure_surfaces_and_allows_retry() {
        let (acquirer, flags) = ScriptedAcquirer::new(vec![Err(
            CaptureError::PermissionDenied("screen share declined".into()),
        )]);
        let recorder = ScriptedRecorder::new(vec![vec![7; 100]]);
        let mut h = harness(acquirer, flags, vec![recorder], false);

        let result = h.controller.start("project-1").await;
        assert!(matches!(result, Err(CaptureError::PermissionDenied(_))));
        let status = h.controller.status_handle().get().await;
        assert_eq!(status.phase, CapturePhase::Failed);
        assert!(status.last_error.is_some());
        // Nothing was granted, so nothing needed releasing.
        assert!(h.flags.lock().unwrap().is_empty());

        // The failure does not wedge the controller.
        h.controller.start("project-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_start_rejected_while_active() {
        let (acquirer, flags) = ScriptedAcquirer::granting();
        let recorder = ScriptedRecorder::new(vec![vec![7; 100]]);
        let mut h = harness(acquirer, flags, vec![recorder], false);

        h.controller.start("project-1").await.unwrap();
        let result = h.controller.start("project-2").await;
        assert!(matches!(result, Err(CaptureError::SessionAlreadyActive)));

        // The original session is untouched and still stoppable.
        let status = h.controller.status_handle().get().await;
        assert_eq!(status.project_id, Some("project-1".to_string()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_failure_leaves_artifact_for_download() {
        let (acquirer, flags) = ScriptedAcquirer::granting();
        let recorder = ScriptedRecorder::new(vec![vec![9; 512]]);
        let mut h = harness(acquirer, flags, vec![recorder], true);

        h.controller.start("project-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.controller.stop().await.unwrap();

        let result = h.controller.save("doomed").await;
        assert!(matches!(
            result,
            Err(ControllerError::Persist(PersistError::UploadFailed(_)))
        ));
        assert!(h.store.list("project-1").unwrap().is_empty());

        // The artifact is still held, so the local fallback works.
        let path = h.controller.download().await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap().len(), 512);
    }

    #[tokio::test]
    async fn test_save_without_artifact() {
        let (acquirer, flags) = ScriptedAcquirer::granting();
        let h = harness(acquirer, flags, Vec::new(), false);
        assert!(matches!(
            h.controller.save("nothing").await,
            Err(ControllerError::NothingToSave)
        ));
        assert!(matches!(
            h.controller.download().await,
            Err(ControllerError::NothingToSave)
        ));
    }

    #[tokio::test]
    async fn test_pause_without_session_is_a_noop() {
        let (acquirer, flags) = ScriptedAcquirer::granting();
        let mut h = harness(acquirer, flags, Vec::new(), false);
        assert_eq!(
            h.controller.pause_or_resume().await,
            PauseOutcome::NoEffect(CapturePhase::Idle)
        );
    }
}
