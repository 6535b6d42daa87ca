//! Remote object store contract and its HTTP implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::StorageConfig;

/// Narrow storage contract: bytes in, public URL out. Storage is the
/// source of truth for artifact bytes; metadata rows only point at it.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    fn public_url(&self, path: &str) -> String;
}

/// Object key for an upload: namespaced per project, timestamped plus a
/// unique suffix so concurrent saves never collide.
pub fn object_path(project_id: &str, extension: &str) -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    let unique = uuid::Uuid::new_v4().simple().to_string();
    format!("{project_id}/{timestamp}-{}.{extension}", &unique[..8])
}

/// PUT-based HTTP storage with optional bearer auth.
pub struct HttpStorage {
    client: reqwest::Client,
    endpoint: String,
    public_base: String,
    api_key: Option<String>,
}

impl HttpStorage {
    pub fn new(config: &StorageConfig) -> Self {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        let public_base = config
            .public_base_url
            .as_deref()
            .unwrap_or(&endpoint)
            .trim_end_matches('/')
            .to_string();

        info!("Object store endpoint: {}", endpoint);

        Self {
            client: reqwest::Client::new(),
            endpoint,
            public_base,
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl StorageBackend for HttpStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = format!("{}/{}", self.endpoint, path);
        let size = bytes.len();
        debug!("Uploading {} bytes to {}", size, url);

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type.to_string())
            .body(bytes);

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("Failed to send upload request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Upload rejected with status {status}: {body}");
        }

        info!("Uploaded {} bytes to {}", size, path);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path_shape() {
        let path = object_path("project-1", "mkv");
        assert!(path.starts_with("project-1/"));
        assert!(path.ends_with(".mkv"));
    }

    #[test]
    fn test_object_paths_do_not_collide() {
        let a = object_path("project-1", "mkv");
        let b = object_path("project-1", "mkv");
        assert_ne!(a, b);
    }

    #[test]
    fn test_public_url_prefers_configured_base() {
        let storage = HttpStorage::new(&StorageConfig {
            endpoint: "http://internal:9000/bucket/".to_string(),
            api_key: None,
            public_base_url: Some("https://cdn.example.com/recordings".to_string()),
        });
        assert_eq!(
            storage.public_url("p/x.mkv"),
            "https://cdn.example.com/recordings/p/x.mkv"
        );
    }
}
