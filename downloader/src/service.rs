use crate::DownloaderError;
use crate::params::TransferParams;
use crate::transfer::Transfer;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use shared::http::{full_body, make_json_error_response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub const SUCCESS_BODY: &str = "SUCCESS";

/// Runs one transfer per request. Parameters are read from the query string
/// regardless of path and method.
pub struct DownloaderService {
    transfer: Arc<Transfer>,
}

impl DownloaderService {
    pub fn new(transfer: Arc<Transfer>) -> Self {
        Self { transfer }
    }
}

impl Service<Request<Incoming>> for DownloaderService {
    type Response = Response<BoxBody<Bytes, DownloaderError>>;
    type Error = DownloaderError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let transfer = self.transfer.clone();
        let params = TransferParams::from_query(req.uri().query().unwrap_or_default());
        tracing::info!(
            method = %req.method(),
            path = req.uri().path(),
            source = params.api_source_name.as_deref().unwrap_or_default(),
            "received transfer request"
        );

        Box::pin(async move {
            let res = match transfer.handle(params).await {
                Ok(outcome) => {
                    tracing::info!(
                        bucket = %outcome.bucket,
                        object = %outcome.object_name,
                        records = outcome.records,
                        "transfer completed"
                    );
                    Response::new(full_body(SUCCESS_BODY))
                }
                Err(e) => make_json_error_response(e.status_code(), &e.to_string()),
            };
            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::secrets::FilesystemSecretSource;
    use crate::storage::FilesystemObjectStore;
    use shared::http::serve_listener;
    use tokio::net::TcpListener;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        base_url: String,
        secrets: tempfile::TempDir,
        objects: tempfile::TempDir,
        _scratch: tempfile::TempDir,
    }

    async fn spawn_service() -> Fixture {
        let secrets = tempfile::tempdir().unwrap();
        let objects = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let transfer = Transfer::new(
            Arc::new(FilesystemSecretSource::new(secrets.path())),
            Arc::new(FilesystemObjectStore::new(objects.path())),
            reqwest::Client::new(),
            RetryPolicy::immediate(2),
            scratch.path().to_path_buf(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_listener(
            listener,
            DownloaderService::new(Arc::new(transfer)),
        ));

        Fixture {
            base_url: format!("http://{addr}"),
            secrets,
            objects,
            _scratch: scratch,
        }
    }

    #[tokio::test]
    async fn test_successful_request() {
        let api = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "key-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"items":[{"a b":1}]}"#),
            )
            .mount(&api)
            .await;

        let fixture = spawn_service().await;
        std::fs::create_dir_all(fixture.secrets.path().join("proj")).unwrap();
        std::fs::write(fixture.secrets.path().join("proj/key"), "key-1\n").unwrap();

        let response = reqwest::Client::new()
            .get(&fixture.base_url)
            .query(&[
                ("api_url", api.uri().as_str()),
                ("api_source_name", "items"),
                ("api_method", "GET"),
                ("root_element", "items"),
                ("output_bucket", "bucket"),
                ("output_folder", "folder"),
                ("project_id", "proj"),
                ("api_secret_id", "key"),
            ])
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), SUCCESS_BODY);

        let today = chrono::Utc::now().date_naive().format("%Y%m%d");
        let written = fixture
            .objects
            .path()
            .join(format!("bucket/folder/items_{today}.json"));
        assert_eq!(std::fs::read_to_string(written).unwrap(), "{\"a_b\":1}\n");
    }

    #[tokio::test]
    async fn test_validation_error_is_bad_request() {
        let fixture = spawn_service().await;

        let response = reqwest::Client::new()
            .post(format!("{}/anything?api_method=DELETE", fixture.base_url))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body: serde_json::Value = response.json().await.unwrap();
        assert!(
            body["error_message"]
                .as_str()
                .unwrap()
                .contains("unsupported api_method 'DELETE'")
        );
    }

    #[tokio::test]
    async fn test_upstream_error_is_internal_error() {
        let api = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&api)
            .await;

        let fixture = spawn_service().await;
        std::fs::create_dir_all(fixture.secrets.path().join("proj")).unwrap();
        std::fs::write(fixture.secrets.path().join("proj/key"), "key-1").unwrap();

        let response = reqwest::Client::new()
            .get(&fixture.base_url)
            .query(&[
                ("api_url", api.uri().as_str()),
                ("api_source_name", "items"),
                ("api_method", "GET"),
                ("root_element", "items"),
                ("output_bucket", "bucket"),
                ("output_folder", "folder"),
                ("project_id", "proj"),
                ("api_secret_id", "key"),
            ])
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 500);
        let body: serde_json::Value = response.json().await.unwrap();
        assert!(
            body["error_message"]
                .as_str()
                .unwrap()
                .starts_with("data fetch failed")
        );
    }
}
