//! Microphone grant via cpal.
//!
//! Opening the device is the grant: the stream stays alive for the whole
//! session so the OS input indicator reflects the recording, and the
//! buffered samples feed the preview level meter. The encoder reads the
//! same device independently through the audio server.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use crate::capture::CaptureError;

use super::track::{EncoderInput, MediaTrack, TrackKind};

/// Samples retained for the preview meter.
const LEVEL_WINDOW: usize = 4096;

pub struct MicTrack {
    label: String,
    /// Audio-server source the encoder opens. The resolved device name
    /// when one was requested, "default" otherwise.
    target: String,
    samples: Arc<Mutex<Vec<f32>>>,
    stream: Option<cpal::Stream>,
}

impl MicTrack {
    /// Open the microphone. `preferred` selects a device by name; empty or
    /// absent means the default input device.
    pub fn open(preferred: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let preferred = preferred.filter(|name| !name.is_empty());

        let device = match preferred {
            Some(name) => host
                .input_devices()
                .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| {
                    CaptureError::DeviceUnavailable(format!("no input device named {name}"))
                })?,
            None => host.default_input_device().ok_or_else(|| {
                CaptureError::DeviceUnavailable("no default input device".to_string())
            })?,
        };

        let label = device.name().unwrap_or_else(|_| "microphone".to_string());
        let target = encoder_target(preferred, &label);

        let default_config = device
            .default_input_config()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let samples = Arc::new(Mutex::new(Vec::new()));
        let samples_clone = samples.clone();
        let err_fn = |err| error!("Microphone stream error: {}", err);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut samples) = samples_clone.lock() {
                        samples.extend_from_slice(data);
                        if samples.len() > LEVEL_WINDOW {
                            let excess = samples.len() - LEVEL_WINDOW;
                            samples.drain(..excess);
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(map_build_error)?;

        stream
            .play()
            .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;

        info!("Microphone grant acquired: {}", label);

        Ok(Self {
            label,
            target,
            samples,
            stream: Some(stream),
        })
    }
}

/// Audio-server source the encoder records from. A requested device keeps
/// its resolved name; only an unspecified device falls back to the
/// server's default source.
fn encoder_target(preferred: Option<&str>, label: &str) -> String {
    match preferred {
        Some(_) => label.to_string(),
        None => "default".to_string(),
    }
}

/// A backend refusal is a permission problem; everything else means the
/// device cannot serve this capture.
fn map_build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::BackendSpecific { err } => {
            CaptureError::PermissionDenied(err.to_string())
        }
        other => CaptureError::DeviceUnavailable(other.to_string()),
    }
}

impl MediaTrack for MicTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn encoder_input(&self) -> EncoderInput {
        EncoderInput::new("pulse", self.target.clone())
    }

    fn is_live(&self) -> bool {
        self.stream.is_some()
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!("Releasing microphone grant: {}", self.label);
            drop(stream);
        }
        if let Ok(mut samples) = self.samples.lock() {
            samples.clear();
            samples.shrink_to_fit();
        }
    }

    fn level(&self) -> Option<f32> {
        let samples = self.samples.lock().ok()?;
        if samples.is_empty() {
            return Some(0.0);
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        Some((sum_sq / samples.len() as f32).sqrt().min(1.0))
    }
}

impl Drop for MicTrack {
    fn drop(&mut self) {
        if self.is_live() {
            debug!("Dropping live MicTrack, cleaning up");
            self.stop();
        }
    }
}
