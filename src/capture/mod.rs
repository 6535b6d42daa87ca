//! Capture lifecycle: state machine, chunk accumulation, recorder primitive.

pub mod accumulator;
pub mod machine;
pub mod recorder;
pub mod state;

pub use accumulator::{ChunkAccumulator, RecordingArtifact};
pub use machine::{CaptureEvent, CaptureMachine, PauseOutcome};
pub use recorder::{ChunkRecorder, EncoderRecorder, EncoderRecorderBuilder, RecorderBuilder};
pub use state::{CapturePhase, CaptureStatus, CaptureStatusHandle};

/// Failures of the capture side of a session. Persistence failures live in
/// [`crate::persist::PersistError`].
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("a recording session is already active")]
    SessionAlreadyActive,

    #[error("capture produced no usable data")]
    EmptyCapture,

    #[error("recorder error: {0}")]
    Recorder(#[from] anyhow::Error),
}
