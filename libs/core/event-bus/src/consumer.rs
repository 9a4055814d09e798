//! Consumer-group reads and acknowledgements for one topic

use redis::aio::ConnectionManager;
use redis::RedisResult;
use tracing::{debug, info, warn};

use crate::config::ConsumerConfig;
use crate::envelope::DomainEvent;
use crate::error::BusError;
use crate::publisher::EVENT_FIELD;

type Entries = Vec<(String, Vec<(String, String)>)>;
type StreamReply = Vec<(String, Entries)>;

/// One entry read from the stream
#[derive(Debug, Clone)]
pub enum Delivery {
    Event {
        message_id: String,
        event: DomainEvent,
    },
    /// The entry had no decodable envelope; it is dead-lettered as-is
    Malformed {
        message_id: String,
        raw: Option<String>,
        error: String,
    },
}

impl Delivery {
    pub fn message_id(&self) -> &str {
        match self {
            Delivery::Event { message_id, .. } | Delivery::Malformed { message_id, .. } => message_id,
        }
    }
}

pub struct TopicConsumer {
    redis: ConnectionManager,
    config: ConsumerConfig,
}

impl TopicConsumer {
    pub fn new(redis: ConnectionManager, config: ConsumerConfig) -> Self {
        Self { redis, config }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// `XGROUP CREATE ... MKSTREAM`, tolerating an existing group
    pub async fn ensure_group(&self) -> Result<(), BusError> {
        let mut conn = self.redis.clone();
        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.topic)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => {
                info!(topic = %self.config.topic, group = %self.config.consumer_group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(topic = %self.config.topic, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(BusError::Redis(e)),
        }
    }

    /// Entries delivered to this consumer earlier but never acknowledged
    pub async fn read_pending(&self) -> Result<Vec<Delivery>, BusError> {
        self.read_group("0", None).await
    }

    /// New entries; blocks up to `block_timeout_ms`
    pub async fn read_new(&self) -> Result<Vec<Delivery>, BusError> {
        self.read_group(">", Some(self.config.block_timeout_ms)).await
    }

    async fn read_group(&self, cursor: &str, block_ms: Option<u64>) -> Result<Vec<Delivery>, BusError> {
        let mut conn = self.redis.clone();
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg("COUNT")
            .arg(self.config.batch_size);
        if let Some(ms) = block_ms {
            cmd.arg("BLOCK").arg(ms);
        }
        cmd.arg("STREAMS").arg(&self.config.topic).arg(cursor);

        let reply: Option<StreamReply> = cmd.query_async(&mut conn).await?;
        Ok(reply
            .unwrap_or_default()
            .into_iter()
            .flat_map(|(_, entries)| parse_entries(entries))
            .collect())
    }

    /// Take over entries another consumer left idle past `claim_idle_ms`
    pub async fn claim_abandoned(&self) -> Result<Vec<Delivery>, BusError> {
        let mut conn = self.redis.clone();
        let pending: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(&self.config.topic)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(self.config.claim_idle_ms)
            .arg("-")
            .arg("+")
            .arg(self.config.batch_size)
            .query_async(&mut conn)
            .await?;

        let ids: Vec<String> = pending
            .into_iter()
            .filter(|(_, owner, _, _)| owner != &self.config.consumer_id)
            .map(|(id, _, _, _)| id)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: Entries = redis::cmd("XCLAIM")
            .arg(&self.config.topic)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg(self.config.claim_idle_ms)
            .arg(&ids)
            .query_async(&mut conn)
            .await?;

        let deliveries = parse_entries(claimed);
        if !deliveries.is_empty() {
            warn!(topic = %self.config.topic, count = deliveries.len(), "Claimed abandoned messages");
        }
        Ok(deliveries)
    }

    pub async fn ack(&self, message_id: &str) -> Result<(), BusError> {
        let mut conn = self.redis.clone();
        let _: i64 = redis::cmd("XACK")
            .arg(&self.config.topic)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

pub(crate) fn parse_entries(entries: Entries) -> Vec<Delivery> {
    entries
        .into_iter()
        .map(|(message_id, fields)| {
            let raw = fields
                .into_iter()
                .find(|(key, _)| key == EVENT_FIELD)
                .map(|(_, value)| value);

            match raw.as_deref().map(serde_json::from_str::<DomainEvent>) {
                Some(Ok(event)) => Delivery::Event { message_id, event },
                Some(Err(e)) => Delivery::Malformed {
                    message_id,
                    raw,
                    error: e.to_string(),
                },
                None => Delivery::Malformed {
                    message_id,
                    raw: None,
                    error: format!("missing '{}' field", EVENT_FIELD),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_entries_separates_malformed() {
        let good = DomainEvent::new("v1.shop.created", "company_service", &json!({"id": 1})).unwrap();
        let entries = vec![
            ("1-0".to_string(), vec![("event".to_string(), serde_json::to_string(&good).unwrap())]),
            ("2-0".to_string(), vec![("event".to_string(), "not json".to_string())]),
            ("3-0".to_string(), vec![("job".to_string(), "{}".to_string())]),
        ];

        let parsed = parse_entries(entries);
        assert_eq!(parsed.len(), 3);
        assert!(matches!(&parsed[0], Delivery::Event { event, .. } if event.id == good.id));
        assert!(matches!(&parsed[1], Delivery::Malformed { raw: Some(r), .. } if r == "not json"));
        assert!(matches!(&parsed[2], Delivery::Malformed { raw: None, error, .. } if error.contains("event")));
        assert_eq!(parsed[2].message_id(), "3-0");
    }
}
