//! Catalog Domain
//!
//! Multi-tenant product catalog kept in two stores: PostgreSQL holds the
//! authoritative, versioned rows and Elasticsearch a denormalized replica for
//! listing and search. Writes are propagated to other services over the
//! Redis Streams event bus, and their events are replicated back in.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ CatalogEventHandler │  ← replicated events
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │   CatalogService    │  ← use cases, validation
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │ Stores / Publisher  │  ← Pg*, EsProductIndex, event bus
//! └─────────────────────┘
//! ```
//!
//! Every write commits relationally first, then publishes its event, then
//! updates the index.
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_catalog::{
//!     CatalogConfig, CatalogDeps, CatalogService, EsProductIndex, HttpObjectStorage, PgProductStore,
//!     PgReferenceStore, PgTenantStore,
//! };
//! use std::sync::Arc;
//!
//! let config = CatalogConfig::new("cdn.example.com");
//! let service = CatalogService::new(
//!     CatalogDeps {
//!         products: Arc::new(PgProductStore::new(db.clone())),
//!         index: Arc::new(EsProductIndex::new(elastic)),
//!         references: Arc::new(PgReferenceStore::new(db.clone())),
//!         tenants: Arc::new(PgTenantStore::new(db)),
//!         publisher: Arc::new(publisher),
//!         storage: Arc::new(HttpObjectStorage::new(&config.minio_endpoint)?),
//!     },
//!     config,
//! );
//! ```

pub mod bulk_edit;
pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod labels;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod search;
pub mod service;
pub mod storage;

#[cfg(test)]
mod test_fixtures;

pub use bulk_edit::{BulkChange, BulkEditField, BulkEditRequest};
pub use config::CatalogConfig;
pub use error::{CatalogError, CatalogResult};
pub use events::{CatalogEventHandler, ConsumedTopic};
pub use export::{ExportField, ExportRequest};
pub use labels::{LabelContent, LabelField, LabelTemplate, RenderLabelsRequest};
pub use models::RequestContext;
pub use postgres::{PgProductStore, PgReferenceStore, PgTenantStore};
pub use repository::{EventPublisher, ObjectStorage, ProductIndex, ProductStore, ReferenceStore, TenantStore};
pub use search::EsProductIndex;
pub use service::{CatalogDeps, CatalogService};
pub use storage::HttpObjectStorage;
