//! Durable storage for uploaded source images.
//!
//! The [`ObjectStore`] trait is the seam the render orchestrator writes
//! through. [`FsObjectStore`] keeps objects under a local directory and
//! serves them back through the `/files/{*key}` route.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::{Rng, distr::Alphanumeric};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Image payload is not valid base64: {0}")]
    InvalidPayload(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Object store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A stored object and the URL it can be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Object store backed by a local directory
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!(
            "Storing {} ({} bytes, {}) at {}",
            key,
            bytes.len(),
            content_type,
            path.display()
        );
        tokio::fs::write(&path, bytes).await?;
        Ok(StoredObject {
            key: key.to_string(),
            url: format!("{}/files/{}", self.public_base_url, key),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Decoded upload: raw bytes plus the media type declared by a data URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub media_type: Option<String>,
}

/// Accepts `data:image/png;base64,...` or bare base64.
pub fn decode_image(payload: &str) -> Result<ImagePayload, StorageError> {
    let payload = payload.trim();
    let (media_type, encoded) = match payload.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest
                .split_once(',')
                .ok_or_else(|| StorageError::InvalidPayload("data URI has no data".to_string()))?;
            let media_type = header
                .strip_suffix(";base64")
                .ok_or_else(|| StorageError::InvalidPayload("data URI is not base64".to_string()))?;
            (Some(media_type.to_string()).filter(|m| !m.is_empty()), data)
        }
        None => (None, payload),
    };

    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| StorageError::InvalidPayload(e.to_string()))?;
    if bytes.is_empty() {
        return Err(StorageError::InvalidPayload("image is empty".to_string()));
    }
    Ok(ImagePayload { bytes, media_type })
}

/// `renders/{account}/original-{millis}-{suffix}.{ext}`
pub fn original_image_key(account_id: i32, timestamp_millis: i64, extension: &str) -> String {
    let suffix = rand::rng()
        .sample_iter(Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect::<String>();
    format!(
        "renders/{}/original-{}-{}.{}",
        account_id, timestamp_millis, suffix, extension
    )
}
