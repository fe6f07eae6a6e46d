use async_trait::async_trait;
use google_cloud_storage::client::Storage;
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("could not create storage client: {0}")]
    Client(String),

    #[error("upload of {object} to bucket {bucket} failed: {message}")]
    Upload {
        bucket: String,
        object: String,
        message: String,
    },

    #[error("invalid object path {bucket}/{object}")]
    InvalidObjectPath { bucket: String, object: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// True when `value` is non-empty and made only of plain path segments, so it
/// stays below whatever directory it is joined onto.
pub(crate) fn is_plain_relative(value: &str) -> bool {
    let path = Path::new(value);
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

/// Destination for the reshaped output file.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, bucket: &str, object_name: &str, source: &Path)
    -> Result<(), StorageError>;
}

/// Google Cloud Storage, authenticated with application default credentials.
pub struct GcsObjectStore {
    client: Storage,
}

impl GcsObjectStore {
    pub async fn new() -> Result<Self, StorageError> {
        let client = Storage::builder()
            .build()
            .await
            .map_err(|e| StorageError::Client(e.to_string()))?;
        Ok(GcsObjectStore { client })
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        object_name: &str,
        source: &Path,
    ) -> Result<(), StorageError> {
        let payload = tokio::fs::File::open(source).await?;
        let size = payload.metadata().await?.len();

        self.client
            .write_object(format!("projects/_/buckets/{bucket}"), object_name, payload)
            .send_buffered()
            .await
            .map_err(|e| StorageError::Upload {
                bucket: bucket.to_string(),
                object: object_name.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(bucket, object = object_name, size, "object written");
        Ok(())
    }
}

/// Copies objects to `<base_dir>/<bucket>/<object_name>`.
pub struct FilesystemObjectStore {
    base_dir: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FilesystemObjectStore {
            base_dir: base_dir.into(),
        }
    }

    /// Rejects bucket or object names that would resolve outside `base_dir`.
    pub fn object_path(&self, bucket: &str, object_name: &str) -> Result<PathBuf, StorageError> {
        if !is_plain_relative(bucket) || !is_plain_relative(object_name) {
            return Err(StorageError::InvalidObjectPath {
                bucket: bucket.to_string(),
                object: object_name.to_string(),
            });
        }
        Ok(self.base_dir.join(bucket).join(object_name))
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        object_name: &str,
        source: &Path,
    ) -> Result<(), StorageError> {
        let destination = self.object_path(bucket, object_name)?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source, &destination).await?;
        Ok(())
    }
}
