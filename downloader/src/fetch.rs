use crate::plan::{ApiMethod, TransferPlan};
use crate::retry::RetryPolicy;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::path::Path;
use tokio::io::{AsyncWriteExt, BufWriter};

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with status {status}")]
    Status { url: String, status: StatusCode },

    #[error("could not write response to disk: {0}")]
    Io(#[from] std::io::Error),
}

/// Downloads the source API response straight to a local file.
#[derive(Clone)]
pub struct ApiFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl ApiFetcher {
    pub fn new(client: reqwest::Client, retry: RetryPolicy) -> Self {
        ApiFetcher { client, retry }
    }

    /// Returns the number of bytes written to `destination`.
    pub async fn download(
        &self,
        plan: &TransferPlan,
        authorization: &str,
        destination: &Path,
    ) -> Result<u64, FetchError> {
        tracing::info!(source = %plan.source_name, method = %plan.method, "data pull from API running");

        let written = self
            .retry
            .run("fetch", |_| self.download_once(plan, authorization, destination))
            .await
            .inspect_err(|e| {
                tracing::error!(
                    error = %e,
                    url = %plan.url,
                    body = plan.body.as_deref().unwrap_or_default(),
                    "error getting data from API endpoint"
                )
            })?;

        tracing::info!(
            bytes = written,
            path = %destination.display(),
            "data pull from API completed"
        );
        Ok(written)
    }

    async fn download_once(
        &self,
        plan: &TransferPlan,
        authorization: &str,
        destination: &Path,
    ) -> Result<u64, FetchError> {
        let method = match plan.method {
            ApiMethod::Get => reqwest::Method::GET,
            ApiMethod::Post => reqwest::Method::POST,
        };

        let mut request = self
            .client
            .request(method, &plan.url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, authorization);
        if let Some(body) = &plan.body {
            request = request.body(body.clone());
        }

        let request_error = |source| FetchError::Request {
            url: plan.url.clone(),
            source,
        };
        let mut response = request.send().await.map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: plan.url.clone(),
                status,
            });
        }

        // Stream chunk by chunk so large responses never sit in memory.
        let mut writer = BufWriter::new(tokio::fs::File::create(destination).await?);
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(request_error)? {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        Ok(written)
    }
}
