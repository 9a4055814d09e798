//! Prometheus metrics for publishers and workers

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder. Later calls are no-ops.
pub fn init_metrics() -> Result<(), BuildError> {
    PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        info!("Prometheus metrics initialized");
        Ok::<_, BuildError>(handle)
    })?;
    Ok(())
}

/// Current metrics in text exposition format; empty before [`init_metrics`]
pub fn render_metrics() -> String {
    PROMETHEUS_HANDLE.get().map(|h| h.render()).unwrap_or_default()
}

#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Success,
    Retried,
    DeadLettered,
    Failed,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Retried => "retried",
            Outcome::DeadLettered => "dead_lettered",
            Outcome::Failed => "failed",
        }
    }
}

pub fn record_published(topic: &str) {
    counter!("bus_events_published_total", "topic" => topic.to_string()).increment(1);
}

pub fn record_processed(topic: &str, handler: &'static str, outcome: Outcome, elapsed: Duration) {
    counter!(
        "bus_events_processed_total",
        "topic" => topic.to_string(),
        "handler" => handler,
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!("bus_event_duration_seconds", "topic" => topic.to_string(), "handler" => handler)
        .record(elapsed.as_secs_f64());
}

pub fn record_dead_lettered(topic: &str) {
    counter!("bus_events_dead_lettered_total", "topic" => topic.to_string()).increment(1);
}
