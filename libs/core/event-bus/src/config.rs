use uuid::Uuid;

/// Settings of one topic's consumer
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Stream name; equal to the event topic
    pub topic: String,
    pub consumer_group: String,
    /// Unique per process, generated when not set
    pub consumer_id: String,
    /// Defaults to `<topic>.dlq`
    pub dlq_stream: String,
    /// `MAXLEN ~` applied when requeueing and dead-lettering
    pub max_length: i64,
    pub batch_size: usize,
    /// `XREADGROUP BLOCK` timeout; also bounds shutdown latency
    pub block_timeout_ms: u64,
    /// Pending entries idle longer than this are claimed from dead consumers
    pub claim_idle_ms: u64,
}

impl ConsumerConfig {
    pub fn new(topic: impl Into<String>, consumer_group: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            dlq_stream: format!("{}.dlq", topic),
            topic,
            consumer_group: consumer_group.into(),
            consumer_id: format!("catalog-{}", Uuid::new_v4()),
            max_length: 100_000,
            batch_size: 10,
            block_timeout_ms: 2_000,
            claim_idle_ms: 60_000,
        }
    }

    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_block_timeout_ms(mut self, timeout: u64) -> Self {
        self.block_timeout_ms = timeout;
        self
    }

    pub fn with_claim_idle_ms(mut self, idle: u64) -> Self {
        self.claim_idle_ms = idle;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_derive_from_topic() {
        let config = ConsumerConfig::new("v1.order.created", "invan_catalog_service");
        assert_eq!(config.dlq_stream, "v1.order.created.dlq");
        assert!(config.consumer_id.starts_with("catalog-"));
    }

    #[test]
    fn test_batch_size_never_zero() {
        let config = ConsumerConfig::new("t", "g").with_batch_size(0);
        assert_eq!(config.batch_size, 1);
    }
}
