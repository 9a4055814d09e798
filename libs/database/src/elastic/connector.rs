use reqwest::{Client, Method, RequestBuilder};
use std::time::Duration;
use tracing::info;

use super::ElasticConfig;
use crate::common::{DatabaseError, DatabaseResult, RetryConfig, retry_with_backoff};

/// Shared HTTP client bound to one cluster.
///
/// Cloning is cheap; the underlying connection pool is shared.
#[derive(Clone, Debug)]
pub struct ElasticConnection {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticConnection {
    pub fn new(config: ElasticConfig) -> DatabaseResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url,
            username: config.username,
            password: config.password,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a request against `path` (which must begin with `/`), with
    /// credentials attached.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));

        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    /// `GET /` and require a success status
    pub async fn ping(&self) -> DatabaseResult<()> {
        let response = self.request(Method::GET, "/").send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(DatabaseError::ConnectionFailed(format!(
                "elasticsearch ping returned {}",
                response.status()
            )))
        }
    }
}

/// Build the client and verify the cluster answers
pub async fn connect(config: ElasticConfig) -> DatabaseResult<ElasticConnection> {
    let connection = ElasticConnection::new(config)?;
    connection.ping().await?;
    info!(url = %connection.base_url, "Connected to Elasticsearch");
    Ok(connection)
}

pub async fn connect_with_retry(
    config: ElasticConfig,
    retry_config: Option<RetryConfig>,
) -> DatabaseResult<ElasticConnection> {
    retry_with_backoff(|| connect(config.clone()), retry_config.unwrap_or_default()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_connect_pings_cluster_with_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = ElasticConfig::new(server.uri()).with_basic_auth("elastic", "secret");
        let connection = connect(config).await.unwrap();
        assert_eq!(connection.base_url(), server.uri());
    }

    #[tokio::test]
    async fn test_ping_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let connection = ElasticConnection::new(ElasticConfig::new(server.uri())).unwrap();
        let err = connection.ping().await.unwrap_err();
        assert!(matches!(err, DatabaseError::ConnectionFailed(_)));
    }
}
