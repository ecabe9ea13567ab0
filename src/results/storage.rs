//! Object storage access for the bulk-file result path
//!
//! Objects are read sequentially as an `AsyncRead`; nothing is cached across
//! cursors.

use crate::execution::service::{ServiceError, ServiceResult};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::{Client, StatusCode};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;

pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn get_object(&self, location: &str) -> ServiceResult<ObjectReader>;
}

/// Reads `file://` URIs and plain paths, optionally relative to a root
#[derive(Debug, Clone, Default)]
pub struct LocalObjectStorage {
    root: Option<PathBuf>,
}

impl LocalObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        let path = PathBuf::from(location.strip_prefix("file://").unwrap_or(location));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn get_object(&self, location: &str) -> ServiceResult<ObjectReader> {
        let path = self.resolve(location);
        debug!("Opening result object {}", path.display());
        let file = tokio::fs::File::open(&path).await.map_err(|e| {
            let message = format!("cannot open {}: {}", path.display(), e);
            match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    ServiceError::programming(message)
                }
                _ => ServiceError::operational(message),
            }
        })?;
        Ok(Box::new(file))
    }
}

/// Streams objects over HTTP(S).
///
/// `s3://bucket/key` locations are rewritten path-style onto `s3_endpoint`
/// (e.g. a presigning proxy or an S3-compatible gateway).
#[derive(Debug, Clone)]
pub struct HttpObjectStorage {
    client: Client,
    s3_endpoint: Option<String>,
}

impl HttpObjectStorage {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            s3_endpoint: None,
        }
    }

    pub fn with_default_client() -> ServiceResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| ServiceError::programming(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self::new(client))
    }

    pub fn with_s3_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.s3_endpoint = Some(endpoint.into().trim_end_matches('/').to_string());
        self
    }

    pub fn resolve(&self, location: &str) -> ServiceResult<String> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return Ok(location.to_string());
        }
        if let Some(path) = location.strip_prefix("s3://") {
            return match &self.s3_endpoint {
                Some(endpoint) => Ok(format!("{}/{}", endpoint, path)),
                None => Err(ServiceError::programming(format!(
                    "no S3 endpoint configured for {}",
                    location
                ))),
            };
        }
        Err(ServiceError::programming(format!(
            "unsupported object location {}",
            location
        )))
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn get_object(&self, location: &str) -> ServiceResult<ObjectReader> {
        let url = self.resolve(location)?;
        debug!("Downloading result object {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ServiceError::operational(format!("failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("fetch of {} failed with status {}: {}", url, status, text);
            let transient = status.is_server_error()
                || status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::REQUEST_TIMEOUT;
            return Err(if transient {
                ServiceError::operational(message)
            } else {
                ServiceError::programming(message)
            });
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }
}
