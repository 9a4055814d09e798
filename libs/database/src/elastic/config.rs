#[cfg(feature = "config")]
use core_config::{ConfigError, FromEnv, env_optional, env_parse, env_required};

/// Cluster address and credentials
#[derive(Clone, Debug)]
pub struct ElasticConfig {
    /// Base URL without a trailing slash, e.g. `http://localhost:9200`
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Applied to every request made through the connection
    pub request_timeout_secs: u64,
}

impl ElasticConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            username: None,
            password: None,
            request_timeout_secs: 10,
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// Environment variables:
/// - `ELASTIC_SEARCH_URL` (required; the first entry of a comma-separated list is used)
/// - `ELASTIC_SEARCH_USER`, `ELASTIC_SEARCH_PASSWORD` (optional)
/// - `ELASTIC_REQUEST_TIMEOUT_SECS` (default 10)
#[cfg(feature = "config")]
impl FromEnv for ElasticConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let urls = env_required("ELASTIC_SEARCH_URL")?;
        let url = urls
            .split(',')
            .map(str::trim)
            .find(|u| !u.is_empty())
            .ok_or_else(|| ConfigError::ParseError {
                key: "ELASTIC_SEARCH_URL".to_string(),
                details: "no address given".to_string(),
            })?;

        let mut config = Self::new(url);
        config.username = env_optional("ELASTIC_SEARCH_USER");
        config.password = env_optional("ELASTIC_SEARCH_PASSWORD");
        config.request_timeout_secs = env_parse("ELASTIC_REQUEST_TIMEOUT_SECS", "10")?;
        Ok(config)
    }
}
