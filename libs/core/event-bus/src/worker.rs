//! Consumer loop driving an [`EventHandler`] for one topic

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ConsumerConfig;
use crate::consumer::{Delivery, TopicConsumer};
use crate::dlq::DeadLetters;
use crate::envelope::DomainEvent;
use crate::error::BusError;
use crate::metrics::{self, Outcome};

/// Applies one topic's events.
///
/// Handlers see every event at least once and must be idempotent. The error
/// category decides what happens to a failed event: see [`BusError::category`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> Result<(), BusError>;

    fn name(&self) -> &'static str;
}

#[async_trait]
impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    async fn handle(&self, event: &DomainEvent) -> Result<(), BusError> {
        (**self).handle(event).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// What to do with an event whose handler failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FailureAction {
    Retry { delay_ms: u64 },
    DeadLetter,
}

pub(crate) fn failure_action(error: &BusError, retry_count: u32) -> FailureAction {
    if error.should_retry(retry_count) {
        FailureAction::Retry {
            delay_ms: error.category().backoff_delay_ms(retry_count),
        }
    } else {
        FailureAction::DeadLetter
    }
}

/// Handler failure after the retry budget was spent. `event` carries the
/// final `retry_count`.
#[derive(Debug)]
pub(crate) struct Exhausted {
    pub error: BusError,
    pub event: DomainEvent,
}

/// Run `handler` on `event` until it succeeds or the error's retry budget is
/// spent, sleeping the category's backoff between attempts. Returns the
/// number of retries it took.
///
/// Retries happen in place: nothing newer on the topic is handled until this
/// event is settled.
pub(crate) async fn handle_in_place<H: EventHandler + ?Sized>(
    handler: &H,
    event: &DomainEvent,
) -> Result<u32, Exhausted> {
    let mut attempt = event.clone();
    loop {
        let error = match handler.handle(&attempt).await {
            Ok(()) => return Ok(attempt.retry_count - event.retry_count),
            Err(error) => error,
        };

        match failure_action(&error, attempt.retry_count) {
            FailureAction::Retry { delay_ms } => {
                warn!(
                    event_id = %attempt.id,
                    retry_count = attempt.retry_count,
                    delay_ms,
                    error = %error,
                    category = ?error.category(),
                    "Event handler failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt = attempt.with_retry();
            }
            FailureAction::DeadLetter => return Err(Exhausted { error, event: attempt }),
        }
    }
}

/// Sequential consumer for one topic.
///
/// A message is acknowledged only once it was handled, or its retries were
/// spent and it was written to the DLQ. If the DLQ write fails the message
/// stays pending and is picked up again after a restart or claim.
pub struct BusWorker<H: EventHandler> {
    consumer: TopicConsumer,
    dead_letters: DeadLetters,
    handler: H,
    config: ConsumerConfig,
}

impl<H: EventHandler> BusWorker<H> {
    pub fn new(redis: ConnectionManager, handler: H, config: ConsumerConfig) -> Self {
        Self {
            consumer: TopicConsumer::new(redis.clone(), config.clone()),
            dead_letters: DeadLetters::new(redis, &config),
            handler,
            config,
        }
    }

    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), BusError> {
        info!(
            topic = %self.config.topic,
            group = %self.config.consumer_group,
            consumer_id = %self.config.consumer_id,
            handler = self.handler.name(),
            "Starting bus worker"
        );

        self.consumer.ensure_group().await?;

        // Anything this consumer id left unacknowledged goes first
        for delivery in self.consumer.read_pending().await? {
            self.dispatch(delivery).await;
        }

        let claim_interval = Duration::from_millis(self.config.claim_idle_ms);
        let mut last_claim = Instant::now();
        let mut consecutive_errors: u32 = 0;

        while !*shutdown.borrow() {
            match self.consumer.read_new().await {
                Ok(deliveries) => {
                    if consecutive_errors > 0 {
                        info!(topic = %self.config.topic, consecutive_errors, "Bus connection recovered");
                        consecutive_errors = 0;
                    }
                    for delivery in deliveries {
                        self.dispatch(delivery).await;
                    }
                }
                Err(e) if e.is_nogroup() => {
                    warn!(topic = %self.config.topic, "Consumer group missing, recreating");
                    if let Err(err) = self.consumer.ensure_group().await {
                        error!(error = %err, "Failed to recreate consumer group");
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    let backoff = 2u64.pow(consecutive_errors.min(5)).min(30);
                    warn!(topic = %self.config.topic, error = %e, backoff_secs = backoff, "Read failed, backing off");
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                    continue;
                }
            }

            if last_claim.elapsed() >= claim_interval {
                match self.consumer.claim_abandoned().await {
                    Ok(claimed) => {
                        for delivery in claimed {
                            self.dispatch(delivery).await;
                        }
                    }
                    Err(e) => debug!(error = %e, "Claiming abandoned messages failed"),
                }
                last_claim = Instant::now();
            }
        }

        info!(topic = %self.config.topic, "Bus worker stopped");
        Ok(())
    }

    async fn dispatch(&self, delivery: Delivery) {
        let started = Instant::now();

        let settled = match delivery {
            Delivery::Malformed { ref message_id, ref raw, ref error } => {
                warn!(topic = %self.config.topic, message_id = %message_id, error = %error, "Undecodable message");
                self.dead_letter(message_id, raw.as_deref().unwrap_or_default(), error)
                    .await
                    .map(|_| Outcome::DeadLettered)
            }
            Delivery::Event { ref message_id, ref event } => match handle_in_place(&self.handler, event).await {
                Ok(0) => Ok(Outcome::Success),
                Ok(_) => Ok(Outcome::Retried),
                Err(exhausted) => self.settle_failure(message_id, exhausted).await,
            },
        };

        let outcome = match settled {
            Ok(outcome) => match self.consumer.ack(delivery.message_id()).await {
                Ok(()) => outcome,
                Err(e) => {
                    error!(message_id = %delivery.message_id(), error = %e, "Failed to ACK message");
                    Outcome::Failed
                }
            },
            Err(e) => {
                error!(
                    message_id = %delivery.message_id(),
                    error = %e,
                    "Could not dead-letter message, leaving it pending"
                );
                Outcome::Failed
            }
        };

        metrics::record_processed(&self.config.topic, self.handler.name(), outcome, started.elapsed());
    }

    async fn settle_failure(&self, message_id: &str, exhausted: Exhausted) -> Result<Outcome, BusError> {
        let Exhausted { error, event } = exhausted;
        warn!(
            topic = %self.config.topic,
            event_id = %event.id,
            retry_count = event.retry_count,
            error = %error,
            category = ?error.category(),
            "Event handler gave up"
        );

        let raw = serde_json::to_string(&event)?;
        self.dead_letter(message_id, &raw, &error.to_string()).await?;
        Ok(Outcome::DeadLettered)
    }

    async fn dead_letter(&self, message_id: &str, raw: &str, error: &str) -> Result<(), BusError> {
        self.dead_letters.push(message_id, raw, error).await.map(|_| ())
    }
}
