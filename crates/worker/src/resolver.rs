use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Storage is not configured: {0}")]
    NotConfigured(String),
}

/// Where a stored file can be read from.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadReference {
    Url(String),
    Bytes(Vec<u8>),
}

/// Turns an opaque storage location into something a reader can consume.
#[async_trait]
pub trait FileResolver: Send + Sync {
    async fn resolve_download_reference(
        &self,
        location: &str,
    ) -> Result<DownloadReference, ResolveError>;

    /// Resolve and fetch the file's bytes.
    async fn download(&self, location: &str) -> Result<Vec<u8>, ResolveError>;
}

/// Strip a full object-store URL down to its key. Bare keys pass through.
pub fn storage_key(location: &str) -> &str {
    let key = match location.find("amazonaws.com/") {
        Some(i) => &location[i + "amazonaws.com/".len()..],
        None => location,
    };
    key.trim_start_matches('/')
}

/// Files under a local directory, keyed by relative path.
#[derive(Debug, Clone)]
pub struct LocalFileResolver {
    root: PathBuf,
}

impl LocalFileResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, location: &str) -> Result<PathBuf, ResolveError> {
        let key = storage_key(location);
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if key.is_empty() || escapes {
            return Err(ResolveError::InvalidKey(location.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileResolver for LocalFileResolver {
    async fn resolve_download_reference(
        &self,
        location: &str,
    ) -> Result<DownloadReference, ResolveError> {
        Ok(DownloadReference::Bytes(self.download(location).await?))
    }

    async fn download(&self, location: &str) -> Result<Vec<u8>, ResolveError> {
        let path = self.path_for(location)?;
        debug!(path = %path.display(), "Reading stored file");
        tokio::fs::read(&path)
            .await
            .map_err(|source| ResolveError::Io { path, source })
    }
}

/// Files behind an HTTP origin such as a bucket endpoint.
#[derive(Debug, Clone)]
pub struct HttpFileResolver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFileResolver {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, location: &str) -> Result<String, ResolveError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            if location.contains("amazonaws.com/") {
                return Ok(format!("{}/{}", self.base_url, storage_key(location)));
            }
            return Ok(location.to_string());
        }
        let key = storage_key(location);
        if key.is_empty() {
            return Err(ResolveError::InvalidKey(location.to_string()));
        }
        Ok(format!("{}/{}", self.base_url, key))
    }
}

#[async_trait]
impl FileResolver for HttpFileResolver {
    async fn resolve_download_reference(
        &self,
        location: &str,
    ) -> Result<DownloadReference, ResolveError> {
        Ok(DownloadReference::Url(self.url_for(location)?))
    }

    async fn download(&self, location: &str) -> Result<Vec<u8>, ResolveError> {
        let url = self.url_for(location)?;
        debug!(%url, "Downloading stored file");
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}
