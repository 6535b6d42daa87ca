//! Artifact persistence: upload to the object store, then write the
//! metadata row. Upload comes first; storage owns the bytes and the
//! database row only points at them.

pub mod shrink;
pub mod storage;

pub use shrink::{EncoderShrink, ShrinkPass};
pub use storage::{object_path, HttpStorage, StorageBackend};

use tracing::{info, warn};

use crate::capture::RecordingArtifact;
use crate::db::{NewRecording, PersistedRecording, RecordingStore};

/// Failures of the save path. Both leave the in-memory artifact with the
/// caller so a local download can still be offered.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Nothing durable happened; no metadata row was created.
    #[error("upload failed: {0}")]
    UploadFailed(#[source] anyhow::Error),

    /// The bytes uploaded but the row could not be written. The uploaded
    /// object is orphaned at `remote_url` until operational cleanup.
    #[error("recording uploaded to {remote_url} but the metadata write failed: {source}")]
    MetadataWriteFailed {
        remote_url: String,
        #[source]
        source: anyhow::Error,
    },
}

pub struct ArtifactPersister {
    storage: Box<dyn StorageBackend>,
    recordings: RecordingStore,
    shrink: Option<Box<dyn ShrinkPass>>,
}

impl ArtifactPersister {
    pub fn new(storage: Box<dyn StorageBackend>, recordings: RecordingStore) -> Self {
        Self {
            storage,
            recordings,
            shrink: None,
        }
    }

    pub fn with_shrink(mut self, pass: Box<dyn ShrinkPass>) -> Self {
        self.shrink = Some(pass);
        self
    }

    /// Upload the artifact and record it. The artifact is borrowed, never
    /// consumed: on any failure the caller still holds it for retry or
    /// local download.
    pub async fn persist(
        &self,
        artifact: &RecordingArtifact,
        project_id: &str,
        name: &str,
    ) -> Result<PersistedRecording, PersistError> {
        let path = object_path(project_id, artifact.extension());

        let payload = shrink::select_payload(self.shrink.as_deref(), artifact).await;
        let payload_len = payload.len();

        self.storage
            .upload(&path, payload, &artifact.content_type)
            .await
            .map_err(PersistError::UploadFailed)?;

        let remote_url = self.storage.public_url(&path);

        let record = self
            .recordings
            .insert(NewRecording {
                project_id: project_id.to_string(),
                name: name.to_string(),
                remote_url: remote_url.clone(),
                size_bytes: payload_len as i64,
                duration_seconds: artifact.duration_hint.as_secs() as i64,
            })
            .map_err(|source| {
                warn!("Metadata write failed after upload; {} is orphaned", remote_url);
                PersistError::MetadataWriteFailed { remote_url, source }
            })?;

        info!(
            "Persisted recording '{}' for project {} at {}",
            record.name, record.project_id, record.remote_url
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct FakeStorage {
        uploads: Arc<Mutex<Vec<(String, usize, String)>>>,
        fail: bool,
    }

    impl FakeStorage {
        fn new(fail: bool) -> (Self, Arc<Mutex<Vec<(String, usize, String)>>>) {
            let uploads = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    uploads: uploads.clone(),
                    fail,
                },
                uploads,
            )
        }
    }

    #[async_trait]
    impl StorageBackend for FakeStorage {
        async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
            if self.fail {
                anyhow::bail!("storage unreachable");
            }
            self.uploads.lock().unwrap().push((
                path.to_string(),
                bytes.len(),
                content_type.to_string(),
            ));
            Ok(())
        }

        fn public_url(&self, path: &str) -> String {
            format!("https://store.test/{path}")
        }
    }

    fn artifact() -> RecordingArtifact {
        RecordingArtifact {
            bytes: vec![7; 2500],
            content_type: "video/x-matroska".to_string(),
            duration_hint: Duration::from_secs(12),
        }
    }

    fn recording_store() -> (RecordingStore, Database) {
        let db = Database::in_memory().unwrap();
        (RecordingStore::new(db.clone()), db)
    }

    #[tokio::test]
    async fn test_persist_uploads_then_records() {
        let (storage, uploads) = FakeStorage::new(false);
        let (store, _db) = recording_store();
        let persister = ArtifactPersister::new(Box::new(storage), store.clone());

        let record = persister
            .persist(&artifact(), "project-1", "demo take")
            .await
            .unwrap();

        let uploads = uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].0.starts_with("project-1/"));
        assert_eq!(uploads[0].1, 2500);
        assert_eq!(uploads[0].2, "video/x-matroska");

        assert!(record.remote_url.starts_with("https://store.test/project-1/"));
        assert_eq!(store.list("project-1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_failure_writes_no_row() {
        let (storage, _uploads) = FakeStorage::new(true);
        let (store, _db) = recording_store();
        let persister = ArtifactPersister::new(Box::new(storage), store.clone());

        let artifact = artifact();
        let result = persister.persist(&artifact, "project-1", "demo").await;

        assert!(matches!(result, Err(PersistError::UploadFailed(_))));
        assert!(store.list("project-1").unwrap().is_empty());
        // Artifact is still with the caller for the download fallback.
        assert_eq!(artifact.size_bytes(), 2500);
    }

    #[tokio::test]
    async fn test_metadata_failure_reports_orphaned_url() {
        let (storage, uploads) = FakeStorage::new(false);
        let (store, db) = recording_store();
        let persister = ArtifactPersister::new(Box::new(storage), store);

        // Break the metadata store after migration so only the insert fails.
        db.conn().unwrap().execute("DROP TABLE recordings", []).unwrap();

        let result = persister.persist(&artifact(), "project-1", "demo").await;

        match result {
            Err(PersistError::MetadataWriteFailed { remote_url, .. }) => {
                assert!(remote_url.starts_with("https://store.test/project-1/"));
            }
            other => panic!("expected MetadataWriteFailed, got {other:?}"),
        }
        // The bytes did upload; they are orphaned, not lost.
        assert_eq!(uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shrink_result_is_what_uploads() {
        struct HalfShrink;

        #[async_trait]
        impl ShrinkPass for HalfShrink {
            fn name(&self) -> &'static str {
                "half"
            }
            async fn shrink(&self, artifact: &RecordingArtifact) -> Result<Vec<u8>> {
                Ok(artifact.bytes[..artifact.bytes.len() / 2].to_vec())
            }
        }

        let (storage, uploads) = FakeStorage::new(false);
        let (store, _db) = recording_store();
        let persister =
            ArtifactPersister::new(Box::new(storage), store).with_shrink(Box::new(HalfShrink));

        let record = persister.persist(&artifact(), "project-1", "demo").await.unwrap();

        assert_eq!(uploads.lock().unwrap()[0].1, 1250);
        assert_eq!(record.size_bytes, 1250);
    }
}
