use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

use crate::error::{CatalogError, CatalogResult};
use crate::repository::ObjectStorage;

/// Object storage reached with plain HTTP `PUT`s, e.g. a MinIO bucket that
/// accepts anonymous uploads behind a gateway.
#[derive(Clone)]
pub struct HttpObjectStorage {
    client: Client,
    /// Base used for uploads; defaults to `https://{endpoint}`
    upload_base: String,
    /// Host of public URLs
    endpoint: String,
}

impl HttpObjectStorage {
    pub fn new(endpoint: impl Into<String>) -> CatalogResult<Self> {
        let endpoint = endpoint.into();
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CatalogError::dependency("storage client", endpoint.as_str(), e))?;

        Ok(Self {
            client,
            upload_base: format!("https://{}", endpoint),
            endpoint,
        })
    }

    pub fn with_upload_base(mut self, base: impl Into<String>) -> Self {
        self.upload_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("https://{}/{}/{}", self.endpoint, bucket, key)
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) -> CatalogResult<String> {
        let entity = format!("{}/{}", bucket, key);
        let size = bytes.len();

        let response = self
            .client
            .put(format!("{}/{}/{}", self.upload_base, bucket, key))
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| CatalogError::dependency("object upload", entity.as_str(), e))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(CatalogError::dependency("object upload", entity, format!("status {}", status)));
        }

        debug!(object = %entity, size, "Uploaded object");
        Ok(self.public_url(bucket, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_put_returns_public_url() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/file/export.csv"))
            .and(header("content-type", "text/csv"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let storage = HttpObjectStorage::new("cdn.example.com")
            .unwrap()
            .with_upload_base(server.uri());
        let url = storage
            .put("file", "export.csv", b"id\n".to_vec(), "text/csv")
            .await
            .unwrap();

        assert_eq!(url, "https://cdn.example.com/file/export.csv");
    }

    #[tokio::test]
    async fn test_put_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let storage = HttpObjectStorage::new("cdn.example.com")
            .unwrap()
            .with_upload_base(server.uri());
        let err = storage.put("file", "x", vec![], "text/plain").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
