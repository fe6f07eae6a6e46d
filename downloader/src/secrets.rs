use crate::storage::is_plain_relative;
use async_trait::async_trait;
use google_cloud_secretmanager_v1::client::SecretManagerService;
use std::io;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum SecretError {
    #[error("could not create secret manager client: {0}")]
    Client(String),

    #[error("could not access secret {name}: {message}")]
    Access { name: String, message: String },

    #[error("secret {0} not found")]
    NotFound(String),

    #[error("secret {0} has no payload")]
    EmptyPayload(String),

    #[error("secret {0} payload is not valid UTF-8")]
    InvalidPayload(String),

    #[error("invalid secret name {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Resolves the latest version of a named secret.
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn access_latest(&self, project_id: &str, secret_id: &str) -> Result<String, SecretError>;
}

pub fn latest_version_name(project_id: &str, secret_id: &str) -> String {
    format!("projects/{project_id}/secrets/{secret_id}/versions/latest")
}

/// Google Cloud Secret Manager, authenticated with application default
/// credentials.
pub struct GcpSecretManager {
    client: SecretManagerService,
}

impl GcpSecretManager {
    pub async fn new() -> Result<Self, SecretError> {
        let client = SecretManagerService::builder()
            .build()
            .await
            .map_err(|e| SecretError::Client(e.to_string()))?;
        Ok(GcpSecretManager { client })
    }
}

#[async_trait]
impl SecretSource for GcpSecretManager {
    async fn access_latest(&self, project_id: &str, secret_id: &str) -> Result<String, SecretError> {
        let name = latest_version_name(project_id, secret_id);
        tracing::debug!(project_id, secret_id, "accessing secret version");

        let response = self
            .client
            .access_secret_version()
            .set_name(name.clone())
            .send()
            .await
            .map_err(|e| SecretError::Access {
                name: name.clone(),
                message: e.to_string(),
            })?;

        let payload = response
            .payload
            .ok_or_else(|| SecretError::EmptyPayload(name.clone()))?;
        String::from_utf8(payload.data.to_vec()).map_err(|_| SecretError::InvalidPayload(name))
    }
}

/// Reads secrets from `<base_dir>/<project_id>/<secret_id>`. A trailing
/// newline is dropped.
pub struct FilesystemSecretSource {
    base_dir: PathBuf,
}

impl FilesystemSecretSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FilesystemSecretSource {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl SecretSource for FilesystemSecretSource {
    async fn access_latest(&self, project_id: &str, secret_id: &str) -> Result<String, SecretError> {
        // Each name must be a single plain segment below base_dir.
        let single_segment = |value: &str| is_plain_relative(value) && !value.contains(['/', '\\']);
        if !single_segment(project_id) || !single_segment(secret_id) {
            return Err(SecretError::InvalidName(latest_version_name(
                project_id, secret_id,
            )));
        }
        let path = self.base_dir.join(project_id).join(secret_id);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SecretError::NotFound(latest_version_name(
                    project_id, secret_id,
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let value = String::from_utf8(bytes)
            .map_err(|_| SecretError::InvalidPayload(latest_version_name(project_id, secret_id)))?;
        Ok(value.trim_end_matches(['\r', '\n']).to_string())
    }
}
