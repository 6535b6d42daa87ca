//! The recorder primitive: muxes a bundle's tracks into one container
//! stream, drained periodically by the capture machine.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::media::{MediaSourceBundle, MediaTrack};

pub const MATROSKA: &str = "video/x-matroska";

/// Wraps whatever actually encodes the capture. The machine only ever
/// talks to this trait, so tests inject scripted recorders.
#[async_trait]
pub trait ChunkRecorder: Send {
    /// Container identity of the emitted byte stream. Fixed at session
    /// start, never renegotiated mid-capture.
    fn container(&self) -> &str;

    async fn start(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    /// Bytes captured since the previous drain. While paused, only data
    /// produced before the pause is returned; paused output is discarded.
    fn drain(&mut self) -> Vec<u8>;

    /// Stop encoding and return any tail bytes not yet drained.
    async fn stop(&mut self) -> Result<Vec<u8>>;
}

/// Builds a recorder for a freshly acquired bundle.
pub trait RecorderBuilder: Send {
    fn build(&self, bundle: &MediaSourceBundle) -> Result<Box<dyn ChunkRecorder>>;
}

/// Production recorder: an encoder child process (ffmpeg) opens the
/// tracks' device inputs, muxes audio tracks as independent streams and
/// writes streamable Matroska to stdout. A reader task buffers stdout so
/// `drain` never blocks.
pub struct EncoderRecorder {
    program: std::path::PathBuf,
    args: Vec<String>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    buf: Arc<Mutex<Vec<u8>>>,
    paused: bool,
    /// Buffer length at the moment of a pause the encoder itself could not
    /// honor. Bytes past the mark arrived while paused and are dropped;
    /// bytes before it are pre-pause capture and must survive.
    pause_mark: Option<usize>,
}

impl EncoderRecorder {
    pub fn from_bundle(bundle: &MediaSourceBundle, config: &CaptureConfig) -> Result<Self> {
        let program = which::which(&config.encoder)
            .with_context(|| format!("encoder '{}' not found on PATH", config.encoder))?;

        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
        ];

        let mut inputs = 0usize;

        if let Some(video) = bundle.video_track() {
            let input = video.encoder_input();
            args.extend([
                "-f".into(),
                input.format,
                "-video_size".into(),
                format!("{}x{}", config.video_width, config.video_height),
                "-i".into(),
                input.target,
            ]);
            inputs += 1;
        }

        for track in bundle.audio_tracks() {
            let input = track.encoder_input();
            args.extend(["-f".into(), input.format, "-i".into(), input.target]);
            inputs += 1;
        }

        // Each input becomes its own stream; audio tracks are muxed as
        // independent channels, never mixed.
        for i in 0..inputs {
            args.extend(["-map".into(), i.to_string()]);
        }

        if bundle.video_track().is_some() {
            args.extend([
                "-c:v".into(),
                "libvpx".into(),
                "-deadline".into(),
                "realtime".into(),
            ]);
        }
        if !bundle.audio_tracks().is_empty() {
            args.extend(["-c:a".into(), "libopus".into()]);
        }

        args.extend(["-f".into(), "matroska".into(), "-".into()]);

        Ok(Self {
            program,
            args,
            child: None,
            reader: None,
            buf: Arc::new(Mutex::new(Vec::new())),
            paused: false,
            pause_mark: None,
        })
    }

    #[cfg(unix)]
    fn signal(&self, signal: nix::sys::signal::Signal) -> Result<()> {
        let pid = self
            .child
            .as_ref()
            .and_then(|c| c.id())
            .context("encoder process not running")?;
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), signal)
            .with_context(|| format!("failed to send {signal} to encoder"))?;
        Ok(())
    }
}

#[async_trait]
impl ChunkRecorder for EncoderRecorder {
    fn container(&self) -> &str {
        MATROSKA
    }

    async fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            anyhow::bail!("encoder already running");
        }

        debug!("Spawning encoder: {:?} {:?}", self.program, self.args);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn encoder process")?;

        let mut stdout = child
            .stdout
            .take()
            .context("encoder stdout not captured")?;

        let buf = self.buf.clone();
        self.reader = Some(tokio::spawn(async move {
            let mut read_buf = [0u8; 16 * 1024];
            loop {
                match stdout.read(&mut read_buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Ok(mut buf) = buf.lock() {
                            buf.extend_from_slice(&read_buf[..n]);
                        }
                    }
                    Err(e) => {
                        warn!("Encoder stdout read error: {}", e);
                        break;
                    }
                }
            }
        }));

        self.child = Some(child);
        info!("Encoder recorder started");
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        // SIGSTOP halts the encoder, so everything already buffered is
        // pre-pause capture and drains normally.
        #[cfg(unix)]
        self.signal(nix::sys::signal::Signal::SIGSTOP)?;
        #[cfg(not(unix))]
        {
            warn!("Encoder cannot be suspended on this platform; discarding output past this point");
            if let Ok(buf) = self.buf.lock() {
                self.pause_mark = Some(buf.len());
            }
        }
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        #[cfg(unix)]
        self.signal(nix::sys::signal::Signal::SIGCONT)?;
        if self.pause_mark.take().is_some() {
            // Whatever accumulated since the last drain is paused output.
            if let Ok(mut buf) = self.buf.lock() {
                buf.clear();
            }
        }
        self.paused = false;
        Ok(())
    }

    fn drain(&mut self) -> Vec<u8> {
        match self.buf.lock() {
            Ok(mut buf) => drain_buffer(&mut buf, &mut self.pause_mark),
            Err(_) => Vec::new(),
        }
    }

    async fn stop(&mut self) -> Result<Vec<u8>> {
        if self.child.is_some() {
            // A suspended encoder cannot handle the shutdown signal.
            if self.paused {
                #[cfg(unix)]
                {
                    let _ = self.signal(nix::sys::signal::Signal::SIGCONT);
                }
                self.paused = false;
            }

            // SIGINT lets the encoder flush and close the container.
            #[cfg(unix)]
            {
                let _ = self.signal(nix::sys::signal::Signal::SIGINT);
            }

            let mut child = self.child.take().context("encoder child missing")?;

            #[cfg(not(unix))]
            {
                let _ = child.start_kill();
            }

            let status = child.wait().await.context("Failed to wait for encoder")?;
            debug!("Encoder exited: {}", status);
        }

        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }

        let mut tail = match self.buf.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(_) => Vec::new(),
        };
        if let Some(mark) = self.pause_mark.take() {
            tail.truncate(mark);
        }
        info!("Encoder recorder stopped, {} tail bytes", tail.len());
        Ok(tail)
    }
}

/// Split the shared buffer at the pause mark: bytes before the mark were
/// captured before the pause and are returned; bytes past it arrived while
/// paused and are discarded. Without a mark the whole buffer drains.
fn drain_buffer(buf: &mut Vec<u8>, pause_mark: &mut Option<usize>) -> Vec<u8> {
    match pause_mark {
        Some(mark) => {
            let kept = buf[..*mark].to_vec();
            buf.clear();
            *mark = 0;
            kept
        }
        None => std::mem::take(buf),
    }
}

/// [`RecorderBuilder`] for the production encoder.
pub struct EncoderRecorderBuilder {
    config: CaptureConfig,
}

impl EncoderRecorderBuilder {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

impl RecorderBuilder for EncoderRecorderBuilder {
    fn build(&self, bundle: &MediaSourceBundle) -> Result<Box<dyn ChunkRecorder>> {
        Ok(Box::new(EncoderRecorder::from_bundle(bundle, &self.config)?))
    }
}
