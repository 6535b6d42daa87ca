//! Source acquisition: turn device grants into a [`MediaSourceBundle`].

use tracing::{info, warn};

use crate::capture::CaptureError;
use crate::config::CaptureConfig;

use super::bundle::{combine_grants, MediaSourceBundle};
use super::mic::MicTrack;
use super::screen::ScreenTrack;
use super::system_audio::LoopbackTrack;
use super::track::{release_tracks, MediaTrack};

/// Seam between the controller and real devices, so session logic is
/// testable with fake tracks.
pub trait SourceAcquirer {
    /// Acquire all sources for one recording attempt.
    ///
    /// Partial success is not a valid bundle: on any failure every track
    /// already granted has been stopped before the error is returned.
    fn acquire(&mut self) -> Result<MediaSourceBundle, CaptureError>;
}

/// Production acquirer backed by cpal devices and the screen encoder.
pub struct DeviceAcquirer {
    config: CaptureConfig,
}

impl DeviceAcquirer {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Display grant: screen video plus best-effort system audio. A
    /// missing loopback monitor degrades to video-only; a missing screen
    /// fails the grant.
    fn display_grant(&self) -> Result<Vec<Box<dyn MediaTrack>>, CaptureError> {
        let screen = ScreenTrack::open(&self.config)?;
        let mut tracks: Vec<Box<dyn MediaTrack>> = vec![Box::new(screen)];

        match LoopbackTrack::open() {
            Ok(loopback) => tracks.push(Box::new(loopback)),
            Err(e) => warn!("No system audio for this session: {}", e),
        }

        Ok(tracks)
    }
}

impl SourceAcquirer for DeviceAcquirer {
    fn acquire(&mut self) -> Result<MediaSourceBundle, CaptureError> {
        // Microphone first: it is the grant most likely to be declined, so
        // failing it costs nothing to clean up.
        let mic = MicTrack::open(Some(self.config.mic_device.as_str()))?;
        let mut mic_tracks: Vec<Box<dyn MediaTrack>> = vec![Box::new(mic)];

        let display_tracks = match self.display_grant() {
            Ok(tracks) => tracks,
            Err(e) => {
                // The mic is already held; release it or the OS keeps
                // showing a live capture indicator.
                release_tracks(&mut mic_tracks);
                return Err(e);
            }
        };

        let bundle = combine_grants(display_tracks, mic_tracks)?;
        info!(
            "Acquired media bundle: {} tracks ({} audio)",
            bundle.track_count(),
            bundle.audio_tracks().len()
        );
        Ok(bundle)
    }
}
