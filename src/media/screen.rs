//! Screen-video grant.
//!
//! There is no long-lived device handle for a display the way there is for
//! an audio stream: the grant verifies the capture path up front (encoder
//! binary on PATH, a display to point it at) and records the input
//! descriptor the recorder will open. Liveness tracks the session so the
//! resource-release invariant holds uniformly across track kinds.

use std::path::PathBuf;
use tracing::{debug, info};

use crate::capture::CaptureError;
use crate::config::CaptureConfig;

use super::track::{EncoderInput, MediaTrack, TrackKind};

pub struct ScreenTrack {
    label: String,
    display: String,
    width: u32,
    height: u32,
    encoder_path: PathBuf,
    live: bool,
}

impl ScreenTrack {
    pub fn open(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let encoder_path = which::which(&config.encoder).map_err(|_| {
            CaptureError::DeviceUnavailable(format!(
                "screen capture encoder '{}' not found on PATH",
                config.encoder
            ))
        })?;

        let display = if config.display.is_empty() {
            std::env::var("DISPLAY").map_err(|_| {
                CaptureError::DeviceUnavailable("no display to capture".to_string())
            })?
        } else {
            config.display.clone()
        };

        let label = format!("display {display}");
        info!(
            "Screen grant acquired: {} ({}x{} preferred)",
            label, config.video_width, config.video_height
        );

        Ok(Self {
            label,
            display,
            width: config.video_width,
            height: config.video_height,
            encoder_path,
            live: true,
        })
    }

    pub fn encoder_path(&self) -> &PathBuf {
        &self.encoder_path
    }

    /// Preferred capture size; the display may provide less.
    pub fn preferred_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl MediaTrack for ScreenTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn encoder_input(&self) -> EncoderInput {
        EncoderInput::new("x11grab", self.display.clone())
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn stop(&mut self) {
        if self.live {
            debug!("Releasing screen grant: {}", self.label);
            self.live = false;
        }
    }
}
