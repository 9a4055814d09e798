//! Event bus over Redis Streams
//!
//! Every topic is a Redis stream. Each entry carries one JSON-encoded
//! [`DomainEvent`] in its `event` field. Consumers join a consumer group per
//! topic, so several worker replicas share a topic's load while each message
//! is handled by exactly one of them at a time.
//!
//! ## Delivery
//!
//! - At-least-once: a message is acknowledged only after its handler returns.
//!   Handlers must be idempotent.
//! - One message at a time per worker: the next message is handled only after
//!   the previous one was acknowledged or dead-lettered.
//! - Malformed entries (undecodable envelope) and handler errors classified
//!   [`ErrorCategory::Permanent`] go straight to `<topic>.dlq`.
//! - Transient failures are retried in place with an incremented
//!   `retry_count` after an exponential backoff. Once the category's retry
//!   budget is spent the message goes to the DLQ.
//!
//! ```ignore
//! use event_bus::{BusWorker, ConsumerConfig, Publisher};
//!
//! let publisher = Publisher::new(redis.clone(), "catalog_service");
//! publisher.publish("v1.catalog_service.product.created.success", &product).await?;
//!
//! let config = ConsumerConfig::new("v1.company_service.shop.created.success", "invan_catalog_service");
//! BusWorker::new(redis, handler, config).run(shutdown_rx).await?;
//! ```

mod config;
mod consumer;
mod dlq;
mod envelope;
mod error;
mod health;
pub mod metrics;
mod publisher;
mod worker;

pub use config::ConsumerConfig;
pub use consumer::{Delivery, TopicConsumer};
pub use dlq::DeadLetters;
pub use envelope::DomainEvent;
pub use error::{BusError, ErrorCategory};
pub use health::{HealthState, ReadinessCheck, RedisPing, health_router};
pub use publisher::Publisher;
pub use worker::{BusWorker, EventHandler};
