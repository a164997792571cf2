//! Image upload adapter.
//!
//! Reads a local image reference, writes it create-only to object storage
//! under `{owner}/{uuid}.{ext}` and hands back the object's public URL.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{Result, WarrantyError};
use crate::metrics::MetricsCollector;
use crate::models::OwnerId;

/// Extension used when the reference has none
pub const DEFAULT_EXTENSION: &str = "jpg";
/// Content type used when the bytes are not recognized
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";
/// Bound on reading the local image
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Bucket-scoped object storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `path`. Must fail if an object already exists there.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Durable public URL for `path`.
    fn public_url(&self, path: &str) -> String;
}

/// Reader for local image references (file paths or `file://` URIs).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Reads images from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileImageSource;

#[async_trait]
impl ImageSource for FileImageSource {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        let path = reference.strip_prefix("file://").unwrap_or(reference);
        tokio::fs::read(path)
            .await
            .map_err(|e| WarrantyError::Upload(format!("cannot read {path}: {e}")))
    }
}

/// Uploads warranty photos
#[derive(Clone)]
pub struct ImageUploader {
    storage: Arc<dyn ObjectStorage>,
    source: Arc<dyn ImageSource>,
    fetch_timeout: Duration,
    metrics: MetricsCollector,
}

impl ImageUploader {
    pub fn new(storage: Arc<dyn ObjectStorage>, source: Arc<dyn ImageSource>) -> Self {
        Self {
            storage,
            source,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            metrics: MetricsCollector::default(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Upload the image at `reference` for `owner_id` and return its public URL.
    ///
    /// A fresh object name is drawn on every call, so a retry never lands on
    /// the path of a partially failed attempt.
    pub async fn upload(&self, reference: &str, owner_id: OwnerId) -> Result<String> {
        let result = self.try_upload(reference, owner_id).await;
        match &result {
            Ok(url) => info!(owner_id = %owner_id, url = %url, "Warranty image uploaded"),
            Err(e) => error!(owner_id = %owner_id, reference, error = %e, "Image upload failed"),
        }
        result
    }

    async fn try_upload(&self, reference: &str, owner_id: OwnerId) -> Result<String> {
        let bytes = match tokio::time::timeout(self.fetch_timeout, self.source.fetch(reference)).await
        {
            Ok(fetched) => fetched?,
            Err(_) => return Err(WarrantyError::UploadTimeout(self.fetch_timeout.as_secs())),
        };

        let path = object_path(owner_id, reference);
        let content_type = sniff_content_type(&bytes);
        let size = bytes.len();
        debug!(path = %path, content_type, size, "Uploading warranty image");

        self.storage
            .upload(&path, bytes, content_type)
            .await
            .map_err(|e| match e {
                WarrantyError::Upload(_) | WarrantyError::UploadTimeout(_) => e,
                other => WarrantyError::Upload(other.to_string()),
            })?;
        self.metrics.record_upload(size);

        Ok(self.storage.public_url(&path))
    }
}

/// `{owner}/{fresh uuid}.{extension of reference}`
#[must_use]
pub fn object_path(owner_id: OwnerId, reference: &str) -> String {
    format!("{owner_id}/{}.{}", Uuid::new_v4(), extension_of(reference))
}

/// Lowercased extension of the last path segment, or [`DEFAULT_EXTENSION`].
#[must_use]
pub fn extension_of(reference: &str) -> String {
    let without_query = reference.split(['?', '#']).next().unwrap_or(reference);
    Path::new(without_query)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map_or_else(|| DEFAULT_EXTENSION.to_string(), str::to_ascii_lowercase)
}

/// Content type from the leading magic bytes.
#[must_use]
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    const SIGNATURES: [(&[u8], &str); 5] = [
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"BM", "image/bmp"),
    ];

    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(&b"WEBP"[..]) {
        return "image/webp";
    }
    if bytes.get(4..12).is_some_and(|brand| brand == b"ftypheic" || brand == b"ftypheix") {
        return "image/heic";
    }

    SIGNATURES
        .iter()
        .find(|(magic, _)| bytes.starts_with(magic))
        .map_or(DEFAULT_CONTENT_TYPE, |&(_, mime)| mime)
}
