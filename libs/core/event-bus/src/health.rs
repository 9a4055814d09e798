//! Liveness, readiness and metrics endpoints for worker processes

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::metrics;

/// A dependency the process needs before it can do useful work
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self) -> Result<(), String>;
}

/// Redis `PING`
pub struct RedisPing {
    redis: ConnectionManager,
}

impl RedisPing {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl ReadinessCheck for RedisPing {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn check(&self) -> Result<(), String> {
        let mut conn = self.redis.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(reply) if reply == "PONG" => Ok(()),
            Ok(reply) => Err(format!("unexpected response: {}", reply)),
            Err(e) => Err(format!("error: {}", e)),
        }
    }
}

#[derive(Clone)]
pub struct HealthState {
    pub app_name: String,
    pub app_version: String,
    checks: Vec<Arc<dyn ReadinessCheck>>,
}

impl HealthState {
    pub fn new(app_name: impl Into<String>, app_version: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
            checks: Vec::new(),
        }
    }

    pub fn with_check(mut self, check: impl ReadinessCheck + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    name: String,
    version: String,
}

async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        name: state.app_name,
        version: state.app_version,
    })
}

async fn ready_handler(State(state): State<HealthState>) -> (StatusCode, Json<Value>) {
    let mut results = Map::new();
    let mut ready = true;

    for dependency in &state.checks {
        let result = match dependency.check().await {
            Ok(()) => "ok".to_string(),
            Err(reason) => {
                ready = false;
                reason
            }
        };
        results.insert(dependency.name().to_string(), Value::String(result));
    }

    let (status, label) = if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };
    (status, Json(json!({ "status": label, "checks": results })))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

/// `/health`, `/healthz`, `/ready`, `/readyz` and `/metrics`
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/readyz", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
