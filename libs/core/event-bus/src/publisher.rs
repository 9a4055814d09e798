use redis::aio::ConnectionManager;
use serde::Serialize;
use tracing::debug;

use crate::envelope::DomainEvent;
use crate::error::BusError;
use crate::metrics;

pub(crate) const EVENT_FIELD: &str = "event";

/// Publishes [`DomainEvent`]s onto topic streams.
///
/// Cloning shares the underlying connection.
#[derive(Clone)]
pub struct Publisher {
    redis: ConnectionManager,
    source: String,
    max_length: i64,
}

impl Publisher {
    /// `source` is stamped on every event, normally the service name
    pub fn new(redis: ConnectionManager, source: impl Into<String>) -> Self {
        Self {
            redis,
            source: source.into(),
            max_length: 100_000,
        }
    }

    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Wrap `payload` in a fresh envelope typed after `topic` and append it.
    ///
    /// Returns the stream entry id.
    pub async fn publish<T: Serialize + Sync>(&self, topic: &str, payload: &T) -> Result<String, BusError> {
        let event = DomainEvent::new(topic, self.source.as_str(), payload)?;
        self.publish_event(topic, &event).await
    }

    /// Append an already-built envelope, e.g. a requeued or replayed one
    pub async fn publish_event(&self, topic: &str, event: &DomainEvent) -> Result<String, BusError> {
        let entry_id = append(&self.redis, topic, self.max_length, &[(EVENT_FIELD, serde_json::to_string(event)?)]).await?;

        metrics::record_published(topic);
        debug!(topic, event_id = %event.id, entry_id = %entry_id, "Published event");
        Ok(entry_id)
    }
}

/// `XADD <stream> MAXLEN ~ <n> * field value ...`
pub(crate) async fn append(
    redis: &ConnectionManager,
    stream: &str,
    max_length: i64,
    fields: &[(&str, String)],
) -> Result<String, BusError> {
    let mut conn = redis.clone();
    let mut cmd = redis::cmd("XADD");
    cmd.arg(stream).arg("MAXLEN").arg("~").arg(max_length).arg("*");
    for (key, value) in fields {
        cmd.arg(*key).arg(value);
    }
    Ok(cmd.query_async(&mut conn).await?)
}
