//! System-audio loopback grant (what the narrator's machine is playing).
//!
//! PipeWire/PulseAudio expose the system output as a "monitor" input
//! device. Holding a stream on it is the grant; the encoder reads the
//! same monitor through the audio server.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use crate::capture::CaptureError;

use super::track::{EncoderInput, MediaTrack, TrackKind};

const LEVEL_WINDOW: usize = 4096;

pub struct LoopbackTrack {
    label: String,
    samples: Arc<Mutex<Vec<f32>>>,
    stream: Option<cpal::Stream>,
}

impl LoopbackTrack {
    /// Open the first available monitor source.
    pub fn open() -> Result<Self, CaptureError> {
        let (device, sample_rate) = Self::find_monitor_device().ok_or_else(|| {
            CaptureError::DeviceUnavailable("no system audio monitor source".to_string())
        })?;

        let label = device
            .name()
            .unwrap_or_else(|_| "system audio".to_string());

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let samples = Arc::new(Mutex::new(Vec::new()));
        let samples_clone = samples.clone();
        let err_fn = |err| error!("System audio stream error: {}", err);

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
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        info!("System audio grant acquired: {}", label);

        Ok(Self {
            label,
            samples,
            stream: Some(stream),
        })
    }

    fn find_monitor_device() -> Option<(cpal::Device, u32)> {
        let host = cpal::default_host();

        for device in host.input_devices().ok()? {
            if let Ok(name) = device.name() {
                if name.to_lowercase().contains("monitor") {
                    if let Ok(default_config) = device.default_input_config() {
                        let sample_rate = default_config.sample_rate().0;
                        info!("Found system audio monitor: {} ({}Hz)", name, sample_rate);
                        return Some((device, sample_rate));
                    }
                }
            }
        }

        None
    }
}

impl MediaTrack for LoopbackTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn encoder_input(&self) -> EncoderInput {
        EncoderInput::new("pulse", self.label.clone())
    }

    fn is_live(&self) -> bool {
        self.stream.is_some()
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!("Releasing system audio grant: {}", self.label);
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

impl Drop for LoopbackTrack {
    fn drop(&mut self) {
        if self.is_live() {
            debug!("Dropping live LoopbackTrack, cleaning up");
            self.stop();
        }
    }
}
