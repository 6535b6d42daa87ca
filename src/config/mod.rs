use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
    pub behavior: BehaviorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Interval between chunk emissions while recording, in milliseconds.
    pub chunk_interval_ms: u64,
    /// Preferred capture resolution. The display may provide less.
    pub video_width: u32,
    pub video_height: u32,
    /// Display to capture (e.g. ":0" on X11). Empty = default display.
    pub display: String,
    /// Encoder binary. Resolved on PATH when not absolute.
    pub encoder: String,
    /// Microphone device name. Empty = default input device.
    pub mic_device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base URL of the object store uploads are PUT against.
    pub endpoint: String,
    /// Bearer token sent with upload requests, if set.
    pub api_key: Option<String>,
    /// Base URL recordings are served from. Defaults to `endpoint`.
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Run the advisory shrink pass before uploading.
    pub shrink_before_upload: bool,
    /// Where fallback downloads are written. Empty = data dir downloads/.
    pub download_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3838 }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            chunk_interval_ms: 1000,
            video_width: 1920,
            video_height: 1080,
            display: String::new(),
            encoder: "ffmpeg".to_string(),
            mic_device: String::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000/recordings".to_string(),
            api_key: None,
            public_base_url: None,
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            shrink_before_upload: false,
            download_dir: String::new(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Directory the fallback download lands in.
    pub fn download_dir(&self) -> Result<PathBuf> {
        if self.behavior.download_dir.is_empty() {
            global::downloads_dir()
        } else {
            Ok(PathBuf::from(&self.behavior.download_dir))
        }
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3838);
        assert_eq!(config.capture.chunk_interval_ms, 1000);
        assert_eq!(config.capture.video_width, 1920);
        assert_eq!(config.capture.video_height, 1080);
        assert_eq!(config.capture.encoder, "ffmpeg");
        assert!(!config.behavior.shrink_before_upload);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [capture]
            chunk_interval_ms = 500

            [storage]
            endpoint = "https://store.example.com/bucket"
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.chunk_interval_ms, 500);
        assert_eq!(config.capture.video_width, 1920);
        assert_eq!(config.storage.endpoint, "https://store.example.com/bucket");
        assert_eq!(config.server.port, 3838);
    }

    #[test]
    fn test_roundtrip() {
        let mut config = Config::default();
        config.server.port = 4000;
        config.storage.api_key = Some("secret".to_string());

        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.server.port, 4000);
        assert_eq!(parsed.storage.api_key, Some("secret".to_string()));
    }
}
