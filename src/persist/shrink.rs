//! Advisory size-reduction pass, applied before upload.
//!
//! Strictly best-effort: output is used only when it is a non-empty,
//! strictly smaller payload. Anything else (encoder failure, missing
//! binary, no improvement) keeps the original artifact untouched.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::capture::RecordingArtifact;

#[async_trait]
pub trait ShrinkPass: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce a smaller rendition of the artifact's bytes.
    async fn shrink(&self, artifact: &RecordingArtifact) -> Result<Vec<u8>>;
}

/// Pick the payload to upload: the shrunk bytes when the pass genuinely
/// improved on the original, the original otherwise.
pub async fn select_payload(
    pass: Option<&dyn ShrinkPass>,
    artifact: &RecordingArtifact,
) -> Vec<u8> {
    let Some(pass) = pass else {
        return artifact.bytes.clone();
    };

    match pass.shrink(artifact).await {
        Ok(bytes) if !bytes.is_empty() && bytes.len() < artifact.bytes.len() => {
            debug!(
                "Shrink pass '{}' reduced {} -> {} bytes",
                pass.name(),
                artifact.bytes.len(),
                bytes.len()
            );
            bytes
        }
        Ok(_) => {
            debug!("Shrink pass '{}' produced no improvement", pass.name());
            artifact.bytes.clone()
        }
        Err(e) => {
            warn!("Shrink pass '{}' failed, uploading original: {}", pass.name(), e);
            artifact.bytes.clone()
        }
    }
}

/// Re-encodes the artifact through the external encoder at a lower
/// bitrate, via scratch files in the system temp dir.
pub struct EncoderShrink {
    encoder: String,
}

impl EncoderShrink {
    pub fn new(encoder: impl Into<String>) -> Self {
        Self {
            encoder: encoder.into(),
        }
    }

    fn scratch_path(extension: &str) -> PathBuf {
        let unique = uuid::Uuid::new_v4().simple().to_string();
        std::env::temp_dir().join(format!("boardcast-shrink-{}.{extension}", &unique[..8]))
    }
}

#[async_trait]
impl ShrinkPass for EncoderShrink {
    fn name(&self) -> &'static str {
        "encoder-reencode"
    }

    async fn shrink(&self, artifact: &RecordingArtifact) -> Result<Vec<u8>> {
        let program = which::which(&self.encoder)
            .with_context(|| format!("encoder '{}' not found on PATH", self.encoder))?;

        let extension = artifact.extension();
        let input = Self::scratch_path(extension);
        let output = Self::scratch_path(extension);

        tokio::fs::write(&input, &artifact.bytes)
            .await
            .context("Failed to write shrink input")?;

        let status = tokio::process::Command::new(&program)
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-y",
                "-i",
            ])
            .arg(&input)
            .args(["-c:v", "libvpx", "-crf", "40", "-b:v", "1M", "-c:a", "libopus"])
            .arg(&output)
            .status()
            .await
            .context("Failed to run shrink encoder")?;

        let result = if status.success() {
            tokio::fs::read(&output)
                .await
                .context("Failed to read shrink output")
        } else {
            Err(anyhow::anyhow!("shrink encoder exited with {status}"))
        };

        let _ = tokio::fs::remove_file(&input).await;
        let _ = tokio::fs::remove_file(&output).await;

        result
    }
}
