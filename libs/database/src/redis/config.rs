#[cfg(feature = "config")]
use core_config::{ConfigError, FromEnv};

/// Redis endpoint of the event bus
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// `redis://[user:password@]host:port[/db]`
    pub url: String,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::new("redis://127.0.0.1:6379")
    }
}

/// Reads `REDIS_URL`, falling back to `REDIS_HOST`
#[cfg(feature = "config")]
impl FromEnv for RedisConfig {
    fn from_env() -> Result<Self, ConfigError> {
        std::env::var("REDIS_URL")
            .or_else(|_| std::env::var("REDIS_HOST"))
            .map(Self::new)
            .map_err(|_| ConfigError::MissingEnvVar("REDIS_URL".to_string()))
    }
}
