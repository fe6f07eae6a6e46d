use crate::config::{Config, ObjectStoreConfig, SecretStoreConfig};
use crate::fetch::{ApiFetcher, FetchError};
use crate::metrics_defs::{
    TRANSFER_BYTES, TRANSFER_DURATION, TRANSFER_FAILURES, TRANSFER_RECORDS, TRANSFER_REQUESTS,
};
use crate::params::TransferParams;
use crate::plan::{AuthScheme, TransferPlan, ValidationError};
use crate::reshape::{self, ReshapeError};
use crate::retry::RetryPolicy;
use crate::secrets::{FilesystemSecretSource, GcpSecretManager, SecretError, SecretSource};
use crate::storage::{FilesystemObjectStore, GcsObjectStore, ObjectStore, StorageError};
use crate::token::{TokenClient, TokenError};
use http::StatusCode;
use shared::{counter, histogram};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// `timeout` bounds connecting and each idle read, not the whole response.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
}

#[derive(thiserror::Error, Debug)]
pub enum TransferError {
    #[error("invalid parameters: {0}")]
    Validation(#[from] ValidationError),

    #[error("secret retrieval failed: {0}")]
    Secret(#[from] SecretError),

    #[error("token acquisition failed: {0}")]
    Token(#[from] TokenError),

    #[error("data fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("reshaping to newline JSON failed: {0}")]
    Reshape(#[from] ReshapeError),

    #[error("upload failed: {0}")]
    Storage(#[from] StorageError),

    #[error("scratch directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reshape task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl TransferError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TransferError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Pipeline stage the error came from, used as a metric tag.
    pub fn stage(&self) -> &'static str {
        match self {
            TransferError::Validation(_) => "validation",
            TransferError::Secret(_) => "secret",
            TransferError::Token(_) => "token",
            TransferError::Fetch(_) => "fetch",
            TransferError::Reshape(_) | TransferError::Task(_) => "reshape",
            TransferError::Storage(_) => "upload",
            TransferError::Io(_) => "scratch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub bucket: String,
    pub object_name: String,
    pub bytes_downloaded: u64,
    pub records: usize,
}

/// Runs the fetch, reshape and upload pipeline for one request.
pub struct Transfer {
    secrets: Arc<dyn SecretSource>,
    store: Arc<dyn ObjectStore>,
    tokens: TokenClient,
    fetcher: ApiFetcher,
    retry: RetryPolicy,
    scratch_root: PathBuf,
}

impl Transfer {
    pub fn new(
        secrets: Arc<dyn SecretSource>,
        store: Arc<dyn ObjectStore>,
        client: reqwest::Client,
        retry: RetryPolicy,
        scratch_root: PathBuf,
    ) -> Self {
        Transfer {
            secrets,
            store,
            tokens: TokenClient::new(client.clone(), retry),
            fetcher: ApiFetcher::new(client, retry),
            retry,
            scratch_root,
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self, crate::DownloaderError> {
        let client = http_client(Duration::from_secs(config.http_timeout_secs))?;

        let secrets: Arc<dyn SecretSource> = match &config.secret_store {
            SecretStoreConfig::Gcp => Arc::new(GcpSecretManager::new().await?),
            SecretStoreConfig::Filesystem { base_dir } => {
                Arc::new(FilesystemSecretSource::new(base_dir))
            }
        };
        let store: Arc<dyn ObjectStore> = match &config.object_store {
            ObjectStoreConfig::Gcs => Arc::new(GcsObjectStore::new().await?),
            ObjectStoreConfig::Filesystem { base_dir } => {
                Arc::new(FilesystemObjectStore::new(base_dir))
            }
        };

        Ok(Transfer::new(
            secrets,
            store,
            client,
            (&config.retry).into(),
            config.scratch_root(),
        ))
    }

    /// Ready as long as scratch files can be created.
    pub fn is_ready(&self) -> bool {
        self.scratch_root.is_dir()
    }

    /// Validates the parameters against today's date and runs the transfer.
    pub async fn handle(&self, params: TransferParams) -> Result<TransferOutcome, TransferError> {
        counter!(TRANSFER_REQUESTS).increment(1);
        let start = Instant::now();

        let today = chrono::Utc::now().date_naive();
        let result = match params.into_plan(today) {
            Ok(plan) => self.run(&plan).await,
            Err(e) => Err(e.into()),
        };

        match &result {
            Ok(outcome) => {
                histogram!(TRANSFER_DURATION).record(start.elapsed().as_secs_f64());
                histogram!(TRANSFER_RECORDS).record(outcome.records as f64);
                histogram!(TRANSFER_BYTES).record(outcome.bytes_downloaded as f64);
            }
            Err(e) => {
                counter!(TRANSFER_FAILURES, "stage" => e.stage()).increment(1);
                tracing::error!(error = %e, stage = e.stage(), "error in API downloader");
            }
        }
        result
    }

    pub async fn run(&self, plan: &TransferPlan) -> Result<TransferOutcome, TransferError> {
        // Removed on drop, including on every early return below.
        let scratch = tempfile::Builder::new()
            .prefix("api-downloader-")
            .tempdir_in(&self.scratch_root)?;
        let stem = reshape::sanitize_key(&plan.source_name);
        let raw_path = scratch.path().join(format!("{stem}_api_raw_data.json"));
        let output_path = scratch.path().join(format!("{stem}_api_data.json"));

        let secret = self
            .secrets
            .access_latest(&plan.project_id, &plan.secret_id)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    error = %e,
                    project_id = %plan.project_id,
                    secret_id = %plan.secret_id,
                    "error acquiring the secret"
                )
            })?;
        tracing::info!(secret_id = %plan.secret_id, "secret acquired");

        let authorization = match &plan.auth {
            AuthScheme::ClientCredentials {
                token_url,
                client_id,
            } => {
                self.tokens
                    .fetch_authorization(token_url, client_id, &secret)
                    .await?
            }
            AuthScheme::SecretHeader => secret,
        };

        let bytes_downloaded = self
            .fetcher
            .download(plan, &authorization, &raw_path)
            .await?;

        let records = {
            let (input, output) = (raw_path.clone(), output_path.clone());
            let root_element = plan.root_element.clone();
            tokio::task::spawn_blocking(move || {
                reshape::convert_to_ndjson(&input, &output, &root_element)
            })
            .await?
            .inspect_err(|e| {
                tracing::error!(
                    error = %e,
                    root_element = %plan.root_element,
                    path = %raw_path.display(),
                    "error generating the newline JSON file"
                )
            })?
        };
        tracing::info!(records, path = %output_path.display(), "newline JSON file written");

        let object_name = plan.object_name();
        tracing::info!(bucket = %plan.output_bucket, object = %object_name, "file upload running");
        self.retry
            .run("upload", |_| {
                self.store
                    .upload(&plan.output_bucket, &object_name, &output_path)
            })
            .await?;
        tracing::info!(
            bucket = %plan.output_bucket,
            object = %object_name,
            "file upload completed"
        );

        Ok(TransferOutcome {
            bucket: plan.output_bucket.clone(),
            object_name,
            bytes_downloaded,
            records,
        })
    }
}
