//! Media source acquisition: device grants, tracks, and track combination.

pub mod acquirer;
pub mod bundle;
pub mod mic;
pub mod screen;
pub mod system_audio;
pub mod track;

pub use acquirer::{DeviceAcquirer, SourceAcquirer};
pub use bundle::{combine_grants, MediaSourceBundle, PreviewInfo};
pub use mic::MicTrack;
pub use screen::ScreenTrack;
pub use system_audio::LoopbackTrack;
pub use track::{release_tracks, EncoderInput, MediaTrack, TrackKind};
