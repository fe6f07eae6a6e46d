pub mod config;
pub mod fetch;
pub mod metrics_defs;
pub mod params;
pub mod plan;
pub mod reshape;
pub mod retry;
pub mod secrets;
pub mod service;
pub mod storage;
pub mod template;
pub mod token;
pub mod transfer;

use params::TransferParams;
use service::DownloaderService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use transfer::{Transfer, TransferError, TransferOutcome};

#[derive(thiserror::Error, Debug)]
pub enum DownloaderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ValidationError),
    #[error("could not build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("secret store error: {0}")]
    Secret(#[from] secrets::SecretError),
    #[error("object store error: {0}")]
    Storage(#[from] storage::StorageError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// Serves transfer requests on the main listener and health checks on the
/// admin listener until either listener fails.
pub async fn run(config: config::Config) -> Result<(), DownloaderError> {
    config.validate()?;

    let transfer = Arc::new(Transfer::from_config(&config).await?);

    let readiness = transfer.clone();
    let admin_service = AdminService::<_, DownloaderError>::new(move || readiness.is_ready());
    let downloader_service = DownloaderService::new(transfer);

    let downloader_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        downloader_service,
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(downloader_task, admin_task)?;
    Ok(())
}

/// Performs a single transfer outside of the HTTP service.
pub async fn run_once(
    config: &config::Config,
    params: TransferParams,
) -> Result<TransferOutcome, DownloaderError> {
    config.validate()?;
    let transfer = Transfer::from_config(config).await?;
    Ok(transfer.handle(params).await?)
}
