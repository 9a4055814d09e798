use chrono::Utc;
use redis::aio::ConnectionManager;
use tracing::warn;

use crate::config::ConsumerConfig;
use crate::error::BusError;
use crate::metrics;
use crate::publisher::append;

/// Writes failed messages to a topic's dead-letter stream.
///
/// Entries keep the original raw envelope so they can be replayed onto the
/// topic by hand once the cause is fixed.
#[derive(Clone)]
pub struct DeadLetters {
    redis: ConnectionManager,
    topic: String,
    dlq_stream: String,
    max_length: i64,
}

impl DeadLetters {
    pub fn new(redis: ConnectionManager, config: &ConsumerConfig) -> Self {
        Self {
            redis,
            topic: config.topic.clone(),
            dlq_stream: config.dlq_stream.clone(),
            max_length: config.max_length,
        }
    }

    pub fn stream(&self) -> &str {
        &self.dlq_stream
    }

    pub async fn push(&self, message_id: &str, raw: &str, error: &str) -> Result<String, BusError> {
        let entry = append(
            &self.redis,
            &self.dlq_stream,
            self.max_length,
            &[
                ("event", raw.to_string()),
                ("error", error.to_string()),
                ("original_id", message_id.to_string()),
                ("failed_at", Utc::now().to_rfc3339()),
            ],
        )
        .await?;

        metrics::record_dead_lettered(&self.topic);
        warn!(topic = %self.topic, message_id, dlq = %self.dlq_stream, error, "Moved message to DLQ");
        Ok(entry)
    }

    pub async fn len(&self) -> Result<i64, BusError> {
        let mut conn = self.redis.clone();
        Ok(redis::cmd("XLEN").arg(&self.dlq_stream).query_async(&mut conn).await?)
    }
}
