use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use super::RedisConfig;
use crate::common::{RetryConfig, retry_with_backoff};

/// Open a connection manager and verify it with `PING`
pub async fn connect(config: &RedisConfig) -> redis::RedisResult<ConnectionManager> {
    let client = Client::open(config.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;
    check_health(&manager).await?;

    info!("Connected to Redis");
    Ok(manager)
}

/// [`connect`] with exponential backoff
pub async fn connect_with_retry(
    config: RedisConfig,
    retry_config: Option<RetryConfig>,
) -> redis::RedisResult<ConnectionManager> {
    retry_with_backoff(|| connect(&config), retry_config.unwrap_or_default()).await
}

pub async fn check_health(manager: &ConnectionManager) -> redis::RedisResult<()> {
    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
}
