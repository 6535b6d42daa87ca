//! Capture session phases and the shared status handle.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Phase of a capture session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturePhase {
    Idle,
    Requesting,
    Recording,
    Paused,
    Finalizing,
    Stopped,
    Failed,
}

impl CapturePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Finalizing => "finalizing",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    /// Whether a session in this phase still holds resources or may emit
    /// chunks. Only one such session may exist per controller.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Requesting | Self::Recording | Self::Paused | Self::Finalizing
        )
    }
}

/// Current session state, readable by API handlers.
#[derive(Debug, Clone)]
pub struct CaptureStatus {
    pub phase: CapturePhase,
    pub project_id: Option<String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub stopped_at: Option<chrono::DateTime<chrono::Utc>>,
    pub chunk_count: usize,
    pub captured_bytes: u64,
    pub last_error: Option<String>,
}

impl Default for CaptureStatus {
    fn default() -> Self {
        Self {
            phase: CapturePhase::Idle,
            project_id: None,
            started_at: None,
            stopped_at: None,
            chunk_count: 0,
            captured_bytes: 0,
            last_error: None,
        }
    }
}

impl CaptureStatus {
    /// Wall-clock seconds since recording started.
    pub fn elapsed_seconds(&self) -> Option<u64> {
        self.started_at.map(|started| {
            let end = self.stopped_at.unwrap_or_else(chrono::Utc::now);
            (end - started).num_seconds().max(0) as u64
        })
    }
}

/// Thread-safe handle shared between the capture machine, the controller
/// and API handlers.
#[derive(Clone, Default)]
pub struct CaptureStatusHandle {
    inner: Arc<Mutex<CaptureStatus>>,
}

impl CaptureStatusHandle {
    pub async fn get(&self) -> CaptureStatus {
        self.inner.lock().await.clone()
    }

    /// New session: enters Requesting with fresh counters.
    pub async fn begin(&self, project_id: &str) {
        let mut status = self.inner.lock().await;
        *status = CaptureStatus {
            phase: CapturePhase::Requesting,
            project_id: Some(project_id.to_string()),
            ..CaptureStatus::default()
        };
    }

    pub async fn recording_started(&self) {
        let mut status = self.inner.lock().await;
        status.phase = CapturePhase::Recording;
        status.started_at = Some(chrono::Utc::now());
    }

    pub async fn set_phase(&self, phase: CapturePhase) {
        let mut status = self.inner.lock().await;
        status.phase = phase;
        if phase == CapturePhase::Stopped {
            status.stopped_at = Some(chrono::Utc::now());
        }
    }

    pub async fn add_chunk(&self, bytes: usize) {
        let mut status = self.inner.lock().await;
        status.chunk_count += 1;
        status.captured_bytes += bytes as u64;
    }

    pub async fn fail(&self, error: String) {
        let mut status = self.inner.lock().await;
        status.phase = CapturePhase::Failed;
        status.stopped_at = Some(chrono::Utc::now());
        status.last_error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_as_str() {
        assert_eq!(CapturePhase::Idle.as_str(), "idle");
        assert_eq!(CapturePhase::Requesting.as_str(), "requesting");
        assert_eq!(CapturePhase::Recording.as_str(), "recording");
        assert_eq!(CapturePhase::Paused.as_str(), "paused");
        assert_eq!(CapturePhase::Finalizing.as_str(), "finalizing");
        assert_eq!(CapturePhase::Stopped.as_str(), "stopped");
        assert_eq!(CapturePhase::Failed.as_str(), "failed");
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&CapturePhase::Recording).unwrap();
        assert_eq!(json, "\"recording\"");

        let parsed: CapturePhase = serde_json::from_str("\"finalizing\"").unwrap();
        assert_eq!(parsed, CapturePhase::Finalizing);
    }

    #[test]
    fn test_active_phases() {
        assert!(CapturePhase::Requesting.is_active());
        assert!(CapturePhase::Recording.is_active());
        assert!(CapturePhase::Paused.is_active());
        assert!(CapturePhase::Finalizing.is_active());
        assert!(!CapturePhase::Idle.is_active());
        assert!(!CapturePhase::Stopped.is_active());
        assert!(!CapturePhase::Failed.is_active());
    }

    #[tokio::test]
    async fn test_begin_resets_counters() {
        let handle = CaptureStatusHandle::default();
        handle.begin("project-1").await;
        handle.recording_started().await;
        handle.add_chunk(100).await;

        handle.begin("project-2").await;
        let status = handle.get().await;
        assert_eq!(status.phase, CapturePhase::Requesting);
        assert_eq!(status.project_id, Some("project-2".to_string()));
        assert_eq!(status.chunk_count, 0);
        assert_eq!(status.captured_bytes, 0);
        assert!(status.started_at.is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let handle = CaptureStatusHandle::default();
        handle.begin("project-1").await;
        assert_eq!(handle.get().await.phase, CapturePhase::Requesting);

        handle.recording_started().await;
        let status = handle.get().await;
        assert_eq!(status.phase, CapturePhase::Recording);
        assert!(status.started_at.is_some());

        handle.set_phase(CapturePhase::Paused).await;
        assert_eq!(handle.get().await.phase, CapturePhase::Paused);

        handle.set_phase(CapturePhase::Finalizing).await;
        handle.set_phase(CapturePhase::Stopped).await;
        let status = handle.get().await;
        assert_eq!(status.phase, CapturePhase::Stopped);
        assert!(status.stopped_at.is_some());
    }

    #[tokio::test]
    async fn test_chunk_accounting() {
        let handle = CaptureStatusHandle::default();
        handle.add_chunk(1000).await;
        handle.add_chunk(500).await;

        let status = handle.get().await;
        assert_eq!(status.chunk_count, 2);
        assert_eq!(status.captured_bytes, 1500);
    }

    #[tokio::test]
    async fn test_fail_records_error() {
        let handle = CaptureStatusHandle::default();
        handle.fail("no usable data".to_string()).await;

        let status = handle.get().await;
        assert_eq!(status.phase, CapturePhase::Failed);
        assert_eq!(status.last_error, Some("no usable data".to_string()));
        assert!(status.stopped_at.is_some());
    }
}
