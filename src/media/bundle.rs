//! The combined set of tracks for one recording attempt.
//!
//! `combine_grants` is a pure function from two granted track collections
//! to one bundle, so track-merge rules are testable without real devices.

use serde::Serialize;
use tracing::warn;

use crate::capture::CaptureError;

use super::track::{release_tracks, MediaTrack, TrackKind};

/// Immutable once constructed; every track is live at construction time.
pub struct MediaSourceBundle {
    video: Option<Box<dyn MediaTrack>>,
    audio: Vec<Box<dyn MediaTrack>>,
}

/// Track summary surfaced to the UI while a session is armed.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewInfo {
    pub video: Option<String>,
    pub audio: Vec<String>,
    pub levels: Vec<f32>,
    pub live: bool,
}

impl MediaSourceBundle {
    pub fn video_track(&self) -> Option<&dyn MediaTrack> {
        self.video.as_deref()
    }

    pub fn audio_tracks(&self) -> &[Box<dyn MediaTrack>] {
        &self.audio
    }

    pub fn track_count(&self) -> usize {
        self.audio.len() + usize::from(self.video.is_some())
    }

    pub fn is_live(&self) -> bool {
        self.video.iter().all(|t| t.is_live()) && self.audio.iter().all(|t| t.is_live())
    }

    /// Stop every track, releasing devices and OS capture indicators.
    /// Idempotent.
    pub fn release(&mut self) {
        if let Some(video) = self.video.as_mut() {
            video.stop();
        }
        release_tracks(&mut self.audio);
    }

    pub fn preview(&self) -> PreviewInfo {
        PreviewInfo {
            video: self.video.as_ref().map(|t| t.label().to_string()),
            audio: self.audio.iter().map(|t| t.label().to_string()).collect(),
            levels: self
                .audio
                .iter()
                .map(|t| t.level().unwrap_or(0.0))
                .collect(),
            live: self.is_live(),
        }
    }
}

/// Merge a display grant and a microphone grant into one bundle.
///
/// Video comes from the display grant only (first video track wins, extras
/// are stopped). Audio keeps insertion order: display-grant audio (system
/// loopback) first, then microphone audio. No mixing happens here; the
/// recorder muxes audio tracks as independent channels.
pub fn combine_grants(
    display: Vec<Box<dyn MediaTrack>>,
    mic: Vec<Box<dyn MediaTrack>>,
) -> Result<MediaSourceBundle, CaptureError> {
    let mut video: Option<Box<dyn MediaTrack>> = None;
    let mut audio: Vec<Box<dyn MediaTrack>> = Vec::new();

    for mut track in display {
        match track.kind() {
            TrackKind::Video => {
                if video.is_none() {
                    video = Some(track);
                } else {
                    warn!("Dropping extra video track: {}", track.label());
                    track.stop();
                }
            }
            TrackKind::Audio => audio.push(track),
        }
    }

    for mut track in mic {
        match track.kind() {
            TrackKind::Audio => audio.push(track),
            TrackKind::Video => {
                warn!("Dropping video track from microphone grant: {}", track.label());
                track.stop();
            }
        }
    }

    if video.is_none() && audio.is_empty() {
        return Err(CaptureError::DeviceUnavailable(
            "no tracks granted".to_string(),
        ));
    }

    let mut bundle = MediaSourceBundle { video, audio };
    if !bundle.is_live() {
        bundle.release();
        return Err(CaptureError::DeviceUnavailable(
            "a granted track stopped before the bundle was built".to_string(),
        ));
    }

    Ok(bundle)
}
