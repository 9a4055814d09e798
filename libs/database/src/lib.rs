//! Connectors for the catalog's three backing stores
//!
//! - `postgres` (default): SeaORM connection pool and migration runner for the
//!   relational product store
//! - `redis` (default): connection manager for the Redis Streams event bus
//! - `elastic` (default): HTTP connection to the Elasticsearch product index
//! - `config`: `core_config::FromEnv` implementations for every connector config
//!
//! Every connector has a `*_with_retry` variant that applies exponential
//! backoff.
//!
//! ```ignore
//! use database::{elastic, postgres, redis};
//!
//! let db = postgres::connect_with_retry(PostgresConfig::from_env()?, None).await?;
//! postgres::run_migrations::<migration::Migrator>(&db, "catalog").await?;
//! let bus = redis::connect_with_retry(RedisConfig::from_env()?, None).await?;
//! let index = elastic::connect_with_retry(ElasticConfig::from_env()?, None).await?;
//! ```

pub mod common;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "elastic")]
pub mod elastic;

pub use common::{DatabaseError, DatabaseResult, RetryConfig};
