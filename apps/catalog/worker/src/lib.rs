//! Catalog Worker Service
//!
//! Consumes the events other services publish about companies, shops,
//! suppliers, orders, stock, prices and imported products, and applies them
//! to the catalog's PostgreSQL and Elasticsearch stores.
//!
//! ## Architecture
//!
//! ```text
//! Redis Streams (one per consumed topic)
//!   ↓ (Consumer Group: CONSUMER_GROUP)
//! BusWorker<CatalogEventHandler>  × topics
//!   ↓
//! CatalogService
//!   ↓                    ↓                  ↓
//! PostgreSQL        Elasticsearch     Redis Streams (published events)
//! ```
//!
//! A failed message is retried with backoff or dead-lettered according to
//! its error category; see the `event-bus` crate.

mod readiness;

use axum::Router;
use core_config::server::HealthServerConfig;
use core_config::{Environment, FromEnv, app_info};
use database::elastic::{self, ElasticConfig};
use database::postgres::{self, PostgresConfig};
use database::redis::{self, RedisConfig};
use domain_catalog::{
    CatalogConfig, CatalogDeps, CatalogEventHandler, CatalogService, ConsumedTopic, EsProductIndex,
    HttpObjectStorage, PgProductStore, PgReferenceStore, PgTenantStore,
};
use event_bus::{BusWorker, ConsumerConfig, HealthState, Publisher, RedisPing, health_router, metrics};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

use readiness::{ElasticPing, PostgresPing};

/// Serve `/health`, `/ready` and `/metrics`
async fn start_health_server(health_state: HealthState, config: HealthServerConfig) -> Result<()> {
    let app: Router = health_router(health_state);

    let addr = config.address();
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", addr))?;

    info!(address = %addr, "Health server listening");

    axum::serve(listener, app)
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Run the catalog worker until SIGINT or SIGTERM
///
/// 1. Sets up tracing and metrics
/// 2. Connects to PostgreSQL and applies migrations
/// 3. Connects to Redis and Elasticsearch
/// 4. Starts one bus worker per consumed topic and the health server
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    metrics::init_metrics().wrap_err("Failed to install metrics recorder")?;

    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, "Starting catalog worker");
    info!("Environment: {:?}", environment);

    let health_config = HealthServerConfig::from_env().wrap_err("Failed to load health server configuration")?;
    let catalog_config = CatalogConfig::from_env().wrap_err("Failed to load catalog configuration")?;

    let pg_config = PostgresConfig::from_env().wrap_err("Failed to load PostgreSQL configuration")?;
    info!("Connecting to PostgreSQL...");
    let db = postgres::connect_with_retry(pg_config, None)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    postgres::run_migrations::<migration::Migrator>(&db, &catalog_config.service_name)
        .await
        .wrap_err("Failed to run migrations")?;

    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    info!("Connecting to Redis...");
    let redis = redis::connect_with_retry(redis_config, None)
        .await
        .wrap_err("Failed to connect to Redis")?;

    let elastic_config = ElasticConfig::from_env().wrap_err("Failed to load Elasticsearch configuration")?;
    info!("Connecting to Elasticsearch...");
    let elastic = elastic::connect_with_retry(elastic_config, None)
        .await
        .wrap_err("Failed to connect to Elasticsearch")?;

    let publisher = Publisher::new(redis.clone(), catalog_config.service_name.clone());
    let storage = HttpObjectStorage::new(catalog_config.minio_endpoint.as_str())
        .wrap_err("Failed to build object storage client")?;

    let service = Arc::new(CatalogService::new(
        CatalogDeps {
            products: Arc::new(PgProductStore::new(db.clone())),
            index: Arc::new(EsProductIndex::new(elastic.clone())),
            references: Arc::new(PgReferenceStore::new(db.clone())),
            tenants: Arc::new(PgTenantStore::new(db.clone())),
            publisher: Arc::new(publisher),
            storage: Arc::new(storage),
        },
        catalog_config.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    let health_state = HealthState::new(app_info.name, app_info.version)
        .with_check(RedisPing::new(redis.clone()))
        .with_check(PostgresPing::new(db))
        .with_check(ElasticPing::new(elastic));

    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_config).await {
            error!(error = %e, "Health server failed");
        }
    });

    let mut workers = JoinSet::new();
    for topic in ConsumedTopic::all() {
        let handler = CatalogEventHandler::new(topic, Arc::clone(&service));
        let config = ConsumerConfig::new(topic.topic(), catalog_config.consumer_group.as_str());
        let worker = BusWorker::new(redis.clone(), handler, config);
        let shutdown = shutdown_rx.clone();

        workers.spawn(async move { (topic, worker.run(shutdown).await) });
    }
    info!(workers = workers.len(), group = %catalog_config.consumer_group, "Bus workers started");

    let mut failed = false;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((topic, Err(e))) => {
                error!(topic = topic.topic(), error = %e, "Bus worker stopped with an error");
                failed = true;
            }
            Err(e) => {
                error!(error = %e, "Bus worker task panicked");
                failed = true;
            }
        }
    }

    if failed {
        return Err(eyre::eyre!("One or more bus workers failed"));
    }

    info!("Catalog worker stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.wrap_err("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install signal handler")?
            .recv()
            .await;
        Ok::<(), eyre::Report>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, initiating shutdown...");
        },
        result = terminate => {
            result?;
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
