//! Track abstraction for acquired media sources.
//!
//! A track is one granted device: it holds the device open (so the grant is
//! observable to the user) and tells the recorder how to read it. Tracks are
//! exclusively owned: first by the acquirer, then by the bundle, then by
//! the capture machine for the rest of the session.

/// What a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// How the encoder opens this source (e.g. format "x11grab", target ":0").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInput {
    pub format: String,
    pub target: String,
}

impl EncoderInput {
    pub fn new(format: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            target: target.into(),
        }
    }
}

/// A live media source held for one recording attempt.
///
/// Not `Send`: audio tracks own cpal streams, which must stay on the
/// service task. `stop` releases the underlying device and is idempotent.
pub trait MediaTrack {
    fn kind(&self) -> TrackKind;

    /// Human-readable device name, shown in the preview.
    fn label(&self) -> &str;

    fn encoder_input(&self) -> EncoderInput;

    /// Whether the underlying device is still held open.
    fn is_live(&self) -> bool;

    /// Release the device. Safe to call more than once.
    fn stop(&mut self);

    /// Momentary signal level in [0, 1], for audio preview meters.
    fn level(&self) -> Option<f32> {
        None
    }
}

/// Stop every track in place. Used both for normal session teardown and
/// for cleaning up a partially granted acquisition.
pub fn release_tracks(tracks: &mut [Box<dyn MediaTrack>]) {
    for track in tracks.iter_mut() {
        track.stop();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Scripted track for tests that must not touch real devices.
    pub struct FakeTrack {
        kind: TrackKind,
        label: String,
        live: bool,
    }

    impl FakeTrack {
        pub fn video(label: &str) -> Self {
            Self {
                kind: TrackKind::Video,
                label: label.to_string(),
                live: true,
            }
        }

        pub fn audio(label: &str) -> Self {
            Self {
                kind: TrackKind::Audio,
                label: label.to_string(),
                live: true,
            }
        }

        pub fn stopped(mut self) -> Self {
            self.live = false;
            self
        }
    }

    impl MediaTrack for FakeTrack {
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
            self.live
        }

        fn stop(&mut self) {
            self.live = false;
        }
    }
}
