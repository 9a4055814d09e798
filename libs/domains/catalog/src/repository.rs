use async_trait::async_trait;
use event_bus::Publisher;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::bulk_edit::{BulkChange, BulkEditField};
use crate::error::{CatalogError, CatalogResult};
use crate::models::{
    Category, CategoryInput, Company, CreateMeasurementUnit, CreatedProduct, DefaultMeasurementUnit,
    MeasurementUnit, OrderItem, Page, PriceUpdate, Product, ProductCopy, ProductDocument, ProductInput,
    ProductPage, ProductPatch, ProductQuery, RequestContext, Shop, StockDecrement, StockLevel, StockUpdate, Supplier, Vat,
    VatInput,
};

/// Authoritative relational store of versioned products.
///
/// Every method runs in its own transaction and every query is scoped by
/// the caller's company.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Insert the product at version 1 with its first detail and children
    async fn create(&self, ctx: RequestContext, input: ProductInput) -> CatalogResult<CreatedProduct>;

    /// Bump `current_version` and append a detail at the new version
    async fn update(&self, ctx: RequestContext, id: Uuid, input: ProductInput) -> CatalogResult<CreatedProduct>;

    /// Current version of a live product
    async fn get_by_id(&self, ctx: RequestContext, id: Uuid) -> CatalogResult<Product>;

    async fn delete(&self, ctx: RequestContext, id: Uuid) -> CatalogResult<()>;

    /// Tombstone every id or none of them
    async fn delete_many(&self, ctx: RequestContext, ids: Vec<Uuid>) -> CatalogResult<u64>;

    /// Set stock amounts in one shop; returns the stored rows
    async fn upsert_measurement_values(
        &self,
        ctx: RequestContext,
        shop_id: Uuid,
        levels: Vec<StockLevel>,
    ) -> CatalogResult<Vec<StockUpdate>>;

    /// Set prices in one shop; returns the stored rows
    async fn upsert_shop_prices(
        &self,
        ctx: RequestContext,
        shop_id: Uuid,
        prices: Vec<PriceUpdate>,
    ) -> CatalogResult<Vec<PriceUpdate>>;

    async fn bulk_edit(&self, ctx: RequestContext, product_ids: Vec<Uuid>, change: BulkChange) -> CatalogResult<u64>;

    /// Idempotent insert of products copied from another service
    async fn insert_many(&self, products: Vec<ProductCopy>) -> CatalogResult<()>;

    /// Subtract an order's quantities once per `(order_id, shop_id)`; a
    /// repeated call only reads the current rows back
    async fn decrement_stock(
        &self,
        company_id: Uuid,
        order_id: Uuid,
        shop_id: Uuid,
        items: Vec<OrderItem>,
    ) -> CatalogResult<StockDecrement>;
}

/// Search-index replica of products
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductIndex: Send + Sync {
    /// Index the full document, replacing any previous one
    async fn create(&self, document: ProductDocument) -> CatalogResult<()>;

    /// Merge the document into the stored one, creating it when absent
    async fn update(&self, document: ProductDocument) -> CatalogResult<()>;

    async fn get(&self, company_id: Uuid, id: Uuid) -> CatalogResult<Option<ProductDocument>>;

    async fn get_many(&self, company_id: Uuid, ids: Vec<Uuid>) -> CatalogResult<Vec<ProductDocument>>;

    async fn delete(&self, company_id: Uuid, id: Uuid) -> CatalogResult<()>;

    async fn delete_many(&self, company_id: Uuid, ids: Vec<Uuid>) -> CatalogResult<()>;

    async fn get_all(&self, company_id: Uuid, query: ProductQuery) -> CatalogResult<ProductPage>;

    /// Free-text lookup over sku, name and barcodes
    async fn search(&self, company_id: Uuid, text: String, page: Page) -> CatalogResult<ProductPage>;

    async fn insert_many(&self, documents: Vec<ProductDocument>) -> CatalogResult<()>;

    async fn bulk_update(
        &self,
        company_id: Uuid,
        field: BulkEditField,
        patches: BTreeMap<Uuid, ProductPatch>,
        shop_ids: Vec<Uuid>,
    ) -> CatalogResult<()>;

    async fn upsert_measurement_values(&self, company_id: Uuid, values: Vec<StockUpdate>) -> CatalogResult<()>;

    async fn upsert_shop_prices(&self, company_id: Uuid, prices: Vec<PriceUpdate>) -> CatalogResult<()>;
}

/// Tenant-owned reference data products point at
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn create_measurement_unit(
        &self,
        ctx: RequestContext,
        input: CreateMeasurementUnit,
    ) -> CatalogResult<MeasurementUnit>;

    async fn get_measurement_unit(&self, company_id: Uuid, id: Uuid) -> CatalogResult<MeasurementUnit>;

    async fn list_measurement_units(&self, company_id: Uuid) -> CatalogResult<Vec<MeasurementUnit>>;

    async fn list_default_units(&self) -> CatalogResult<Vec<DefaultMeasurementUnit>>;

    async fn create_category(&self, ctx: RequestContext, input: CategoryInput) -> CatalogResult<Category>;

    async fn update_category(&self, ctx: RequestContext, id: Uuid, input: CategoryInput) -> CatalogResult<Category>;

    /// Tombstone the category and its direct children; returns rows affected
    async fn delete_category(&self, ctx: RequestContext, id: Uuid) -> CatalogResult<u64>;

    async fn get_category(&self, company_id: Uuid, id: Uuid) -> CatalogResult<Category>;

    async fn list_categories(&self, company_id: Uuid) -> CatalogResult<Vec<Category>>;

    async fn create_vat(&self, ctx: RequestContext, input: VatInput) -> CatalogResult<Vat>;

    async fn get_vat(&self, company_id: Uuid, id: Uuid) -> CatalogResult<Vat>;
}

/// Copies of companies, shops and suppliers owned by other services.
///
/// Writes are upserts and tombstones so replayed events converge.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Upsert the company and its default shop and give the company a copy
    /// of every global measurement unit, in one transaction. Returns the
    /// company's copies.
    async fn provision_company(&self, company: Company, shop: Shop) -> CatalogResult<Vec<MeasurementUnit>>;

    async fn upsert_shop(&self, shop: Shop) -> CatalogResult<()>;

    /// Returns whether a live shop was tombstoned
    async fn delete_shop(&self, company_id: Uuid, id: Uuid) -> CatalogResult<bool>;

    async fn upsert_supplier(&self, supplier: Supplier) -> CatalogResult<()>;

    async fn delete_supplier(&self, company_id: Uuid, id: Uuid) -> CatalogResult<bool>;

    async fn get_supplier(&self, company_id: Uuid, id: Uuid) -> CatalogResult<Supplier>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Value) -> CatalogResult<()>;
}

#[async_trait]
impl EventPublisher for Publisher {
    async fn publish(&self, topic: &str, payload: Value) -> CatalogResult<()> {
        Publisher::publish(self, topic, &payload)
            .await
            .map(|_| ())
            .map_err(|e| CatalogError::dependency("event publish", topic, e))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `bucket/key` and return the public URL
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) -> CatalogResult<String>;
}
