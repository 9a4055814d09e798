use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::CatalogConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::events::MeasurementUnitCopy;
use crate::events::topics::{MEASUREMENT_UNIT_CREATED, PRODUCT_CREATED};
use crate::models::{
    Category, CategoryInput, CreateMeasurementUnit, CreatedProduct, DefaultMeasurementUnit, MeasurementUnit,
    Page, PriceUpdate, Product, ProductCopy, ProductDocument, ProductInput, ProductPage, ProductQuery,
    RequestContext, StockLevel, StockUpdate, Vat, VatInput,
};
use crate::repository::{EventPublisher, ObjectStorage, ProductIndex, ProductStore, ReferenceStore, TenantStore};

/// Store and bus handles the service orchestrates
#[derive(Clone)]
pub struct CatalogDeps {
    pub products: Arc<dyn ProductStore>,
    pub index: Arc<dyn ProductIndex>,
    pub references: Arc<dyn ReferenceStore>,
    pub tenants: Arc<dyn TenantStore>,
    pub publisher: Arc<dyn EventPublisher>,
    pub storage: Arc<dyn ObjectStorage>,
}

/// Use cases of the catalog.
///
/// Writes follow one protocol: the relational transaction commits, then the
/// event is published, then the search document is written. A failure after
/// the commit is returned to the caller; [`CatalogService::reindex_product`]
/// repairs the document.
#[derive(Clone)]
pub struct CatalogService {
    pub(crate) products: Arc<dyn ProductStore>,
    pub(crate) index: Arc<dyn ProductIndex>,
    pub(crate) references: Arc<dyn ReferenceStore>,
    pub(crate) tenants: Arc<dyn TenantStore>,
    pub(crate) publisher: Arc<dyn EventPublisher>,
    pub(crate) storage: Arc<dyn ObjectStorage>,
    pub(crate) config: CatalogConfig,
}

impl CatalogService {
    pub fn new(deps: CatalogDeps, config: CatalogConfig) -> Self {
        Self {
            products: deps.products,
            index: deps.index,
            references: deps.references,
            tenants: deps.tenants,
            publisher: deps.publisher,
            storage: deps.storage,
            config,
        }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub(crate) async fn publish<T: Serialize>(&self, topic: &str, payload: &T) -> CatalogResult<()> {
        let payload =
            serde_json::to_value(payload).map_err(|e| CatalogError::dependency("event encode", topic, e))?;
        self.publisher.publish(topic, payload).await
    }

    /// Referenced rows must exist in the caller's company before any write
    async fn resolve_references(&self, ctx: RequestContext, input: &ProductInput) -> CatalogResult<()> {
        self.references
            .get_measurement_unit(ctx.company_id, input.measurement_unit_id)
            .await?;
        self.tenants.get_supplier(ctx.company_id, input.supplier_id).await?;
        self.references.get_vat(ctx.company_id, input.vat_id).await?;
        Ok(())
    }

    /// Publish the committed product and return its document
    async fn propagate(&self, product: &Product) -> CatalogResult<ProductDocument> {
        self.publish(PRODUCT_CREATED, &ProductCopy::from(product)).await?;
        Ok(ProductDocument::from(product))
    }

    // Products

    #[instrument(skip(self, input), fields(company_id = %ctx.company_id, name = %input.name))]
    pub async fn create_product(&self, ctx: RequestContext, input: ProductInput) -> CatalogResult<CreatedProduct> {
        input.validate()?;
        self.resolve_references(ctx, &input).await?;

        let created = self.products.create(ctx, input).await?;
        let product = self.products.get_by_id(ctx, created.product_id).await?;

        let document = self.propagate(&product).await?;
        self.index.create(document).await?;

        info!(product_id = %created.product_id, "Product created");
        Ok(created)
    }

    /// Write a new detail version of the product
    #[instrument(skip(self, input), fields(company_id = %ctx.company_id, product_id = %id))]
    pub async fn update_product(
        &self,
        ctx: RequestContext,
        id: Uuid,
        input: ProductInput,
    ) -> CatalogResult<CreatedProduct> {
        input.validate()?;
        self.resolve_references(ctx, &input).await?;

        let updated = self.products.update(ctx, id, input).await?;
        let product = self.products.get_by_id(ctx, id).await?;

        let document = self.propagate(&product).await?;
        self.index.update(document).await?;

        info!(version = product.current_version, "Product updated");
        Ok(updated)
    }

    #[instrument(skip(self), fields(company_id = %ctx.company_id))]
    pub async fn get_product(&self, ctx: RequestContext, id: Uuid) -> CatalogResult<Product> {
        self.products.get_by_id(ctx, id).await
    }

    #[instrument(skip(self, query), fields(company_id = %ctx.company_id))]
    pub async fn get_all_products(&self, ctx: RequestContext, query: ProductQuery) -> CatalogResult<ProductPage> {
        self.index.get_all(ctx.company_id, query).await
    }

    #[instrument(skip(self), fields(company_id = %ctx.company_id))]
    pub async fn search_products(&self, ctx: RequestContext, text: String, page: Page) -> CatalogResult<ProductPage> {
        self.index.search(ctx.company_id, text, page).await
    }

    #[instrument(skip(self), fields(company_id = %ctx.company_id))]
    pub async fn delete_product(&self, ctx: RequestContext, id: Uuid) -> CatalogResult<()> {
        self.products.delete(ctx, id).await?;
        self.index.delete(ctx.company_id, id).await?;
        info!(product_id = %id, "Product deleted");
        Ok(())
    }

    /// Tombstone every product or none; the index follows only a full commit
    #[instrument(skip(self, ids), fields(company_id = %ctx.company_id, count = ids.len()))]
    pub async fn delete_products(&self, ctx: RequestContext, ids: Vec<Uuid>) -> CatalogResult<u64> {
        if ids.is_empty() {
            return Err(CatalogError::Validation("no products selected".to_string()));
        }

        let deleted = self.products.delete_many(ctx, ids.clone()).await?;
        self.index.delete_many(ctx.company_id, ids).await?;

        info!(deleted, "Products deleted");
        Ok(deleted)
    }

    #[instrument(skip(self, levels), fields(company_id = %ctx.company_id, count = levels.len()))]
    pub async fn upsert_shop_measurement_values(
        &self,
        ctx: RequestContext,
        shop_id: Uuid,
        levels: Vec<StockLevel>,
    ) -> CatalogResult<Vec<StockUpdate>> {
        if levels.is_empty() {
            return Err(CatalogError::Validation("no stock levels given".to_string()));
        }

        let stored = self.products.upsert_measurement_values(ctx, shop_id, levels).await?;
        self.index
            .upsert_measurement_values(ctx.company_id, stored.clone())
            .await?;
        Ok(stored)
    }

    #[instrument(skip(self, prices), fields(company_id = %ctx.company_id, count = prices.len()))]
    pub async fn upsert_shop_prices(
        &self,
        ctx: RequestContext,
        shop_id: Uuid,
        prices: Vec<PriceUpdate>,
    ) -> CatalogResult<Vec<PriceUpdate>> {
        if prices.is_empty() {
            return Err(CatalogError::Validation("no prices given".to_string()));
        }

        let stored = self.products.upsert_shop_prices(ctx, shop_id, prices).await?;
        self.index.upsert_shop_prices(ctx.company_id, stored.clone()).await?;
        Ok(stored)
    }

    /// Re-derive the search document from the relational row. A product that
    /// is gone relationally is removed from the index; returns whether a
    /// document was written.
    #[instrument(skip(self), fields(company_id = %ctx.company_id))]
    pub async fn reindex_product(&self, ctx: RequestContext, id: Uuid) -> CatalogResult<bool> {
        match self.products.get_by_id(ctx, id).await {
            Ok(product) => {
                self.index.create(ProductDocument::from(&product)).await?;
                debug!(product_id = %id, version = product.current_version, "Product reindexed");
                Ok(true)
            }
            Err(CatalogError::NotFound { .. }) => {
                warn!(product_id = %id, "Product gone, dropping its document");
                self.index.delete(ctx.company_id, id).await?;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    // Measurement units

    #[instrument(skip(self), fields(company_id = %ctx.company_id))]
    pub async fn create_measurement_unit(
        &self,
        ctx: RequestContext,
        input: CreateMeasurementUnit,
    ) -> CatalogResult<MeasurementUnit> {
        let unit = self.references.create_measurement_unit(ctx, input).await?;
        self.publish(MEASUREMENT_UNIT_CREATED, &MeasurementUnitCopy::from(&unit))
            .await?;
        Ok(unit)
    }

    pub async fn get_measurement_unit(&self, ctx: RequestContext, id: Uuid) -> CatalogResult<MeasurementUnit> {
        self.references.get_measurement_unit(ctx.company_id, id).await
    }

    pub async fn list_measurement_units(&self, ctx: RequestContext) -> CatalogResult<Vec<MeasurementUnit>> {
        self.references.list_measurement_units(ctx.company_id).await
    }

    pub async fn list_default_units(&self) -> CatalogResult<Vec<DefaultMeasurementUnit>> {
        self.references.list_default_units().await
    }

    // Categories

    #[instrument(skip(self, input), fields(company_id = %ctx.company_id))]
    pub async fn create_category(&self, ctx: RequestContext, input: CategoryInput) -> CatalogResult<Category> {
        input.validate()?;
        self.references.create_category(ctx, input).await
    }

    #[instrument(skip(self, input), fields(company_id = %ctx.company_id))]
    pub async fn update_category(
        &self,
        ctx: RequestContext,
        id: Uuid,
        input: CategoryInput,
    ) -> CatalogResult<Category> {
        input.validate()?;
        self.references.update_category(ctx, id, input).await
    }

    /// Tombstone the category with its direct children
    #[instrument(skip(self), fields(company_id = %ctx.company_id))]
    pub async fn delete_category(&self, ctx: RequestContext, id: Uuid) -> CatalogResult<u64> {
        self.references.delete_category(ctx, id).await
    }

    pub async fn get_category(&self, ctx: RequestContext, id: Uuid) -> CatalogResult<Category> {
        self.references.get_category(ctx.company_id, id).await
    }

    pub async fn list_categories(&self, ctx: RequestContext) -> CatalogResult<Vec<Category>> {
        self.references.list_categories(ctx.company_id).await
    }

    // VAT

    #[instrument(skip(self, input), fields(company_id = %ctx.company_id))]
    pub async fn create_vat(&self, ctx: RequestContext, input: VatInput) -> CatalogResult<Vat> {
        input.validate()?;
        self.references.create_vat(ctx, input).await
    }

    pub async fn get_vat(&self, ctx: RequestContext, id: Uuid) -> CatalogResult<Vat> {
        self.references.get_vat(ctx.company_id, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Supplier;
    use crate::test_fixtures::{TestDeps, measurement_unit, product, vat};
    use mockall::Sequence;

    fn ctx() -> RequestContext {
        RequestContext::new(Uuid::new_v4(), Uuid::new_v4())
    }

    fn input() -> ProductInput {
        ProductInput {
            product_type_id: "single".into(),
            name: "Milk".into(),
            measurement_unit_id: Uuid::new_v4(),
            supplier_id: Uuid::new_v4(),
            vat_id: Uuid::new_v4(),
            ..Default::default()
        }
    }

    fn expect_references(deps: &mut TestDeps) {
        deps.references
            .expect_get_measurement_unit()
            .returning(|company_id, id| Ok(measurement_unit(company_id, id)));
        deps.tenants.expect_get_supplier().returning(|company_id, id| {
            Ok(Supplier {
                id,
                company_id,
                name: "Dairy Co".into(),
                phone_number: String::new(),
            })
        });
        deps.references
            .expect_get_vat()
            .returning(|company_id, id| Ok(vat(company_id, id)));
    }

    #[tokio::test]
    async fn test_create_commits_then_publishes_then_indexes() {
        let ctx = ctx();
        let product_id = Uuid::new_v4();
        let detail_id = Uuid::new_v4();

        let mut deps = TestDeps::default();
        expect_references(&mut deps);
        let mut seq = Sequence::new();

        deps.products
            .expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _| {
                Ok(CreatedProduct {
                    product_id,
                    product_detail_id: detail_id,
                })
            });
        deps.products
            .expect_get_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|ctx, id| Ok(product(ctx.company_id, id, 1, "Milk")));
        deps.publisher
            .expect_publish()
            .withf(move |topic, payload| topic == PRODUCT_CREATED && payload["id"] == product_id.to_string())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        deps.index
            .expect_create()
            .withf(move |document| document.id == product_id && document.name == "Milk")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let created = deps.service().create_product(ctx, input()).await.unwrap();
        assert_eq!(created.product_detail_id, detail_id);
    }

    #[tokio::test]
    async fn test_missing_reference_stops_before_write() {
        let mut deps = TestDeps::default();
        deps.references
            .expect_get_measurement_unit()
            .returning(|_, id| Err(CatalogError::not_found("measurement unit", id)));
        deps.products.expect_create().times(0);
        deps.publisher.expect_publish().times(0);

        let result = deps.service().create_product(ctx(), input()).await;
        assert!(matches!(result, Err(CatalogError::NotFound { entity: "measurement unit", .. })));
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let deps = TestDeps::default();
        let result = deps
            .service()
            .create_product(
                ctx(),
                ProductInput {
                    name: String::new(),
                    ..input()
                },
            )
            .await;
        assert!(matches!(result, Err(CatalogError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_indexes_new_version() {
        let ctx = ctx();
        let id = Uuid::new_v4();

        let mut deps = TestDeps::default();
        expect_references(&mut deps);
        deps.products.expect_update().returning(|_, id, _| {
            Ok(CreatedProduct {
                product_id: id,
                product_detail_id: Uuid::new_v4(),
            })
        });
        deps.products
            .expect_get_by_id()
            .returning(|ctx, id| Ok(product(ctx.company_id, id, 2, "Kefir")));
        deps.publisher
            .expect_publish()
            .withf(|_, payload| payload["name"] == "Kefir")
            .times(1)
            .returning(|_, _| Ok(()));
        deps.index
            .expect_update()
            .withf(move |document| document.id == id && document.name == "Kefir")
            .times(1)
            .returning(|_| Ok(()));

        let updated = deps
            .service()
            .update_product(
                ctx,
                id,
                ProductInput {
                    name: "Kefir".into(),
                    ..input()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.product_id, id);
    }

    #[tokio::test]
    async fn test_index_failure_after_commit_is_reported() {
        let mut deps = TestDeps::default();
        expect_references(&mut deps);
        deps.products.expect_create().returning(|_, _| {
            Ok(CreatedProduct {
                product_id: Uuid::new_v4(),
                product_detail_id: Uuid::new_v4(),
            })
        });
        deps.products
            .expect_get_by_id()
            .returning(|ctx, id| Ok(product(ctx.company_id, id, 1, "Milk")));
        deps.publisher.expect_publish().times(1).returning(|_, _| Ok(()));
        deps.index
            .expect_create()
            .returning(|document| Err(CatalogError::dependency("index create", document.id.to_string(), "503")));

        let err = deps.service().create_product(ctx(), input()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_delete_products_requires_ids_and_full_commit() {
        let deps = TestDeps::default();
        assert!(matches!(
            deps.service().delete_products(ctx(), vec![]).await,
            Err(CatalogError::Validation(_))
        ));

        let mut deps = TestDeps::default();
        deps.products
            .expect_delete_many()
            .returning(|_, ids| Err(CatalogError::PartialBatch { requested: ids.len(), affected: 1 }));
        deps.index.expect_delete_many().times(0);

        let result = deps
            .service()
            .delete_products(ctx(), vec![Uuid::new_v4(), Uuid::new_v4()])
            .await;
        assert!(matches!(result, Err(CatalogError::PartialBatch { requested: 2, affected: 1 })));
    }

    #[tokio::test]
    async fn test_stock_upsert_indexes_stored_rows() {
        let ctx = ctx();
        let shop_id = Uuid::new_v4();
        let product_id = Uuid::new_v4();

        let mut deps = TestDeps::default();
        deps.products
            .expect_upsert_measurement_values()
            .returning(|_, shop_id, levels| {
                Ok(levels
                    .into_iter()
                    .map(|level| StockUpdate {
                        product_id: level.product_id,
                        value: crate::models::ShopMeasurementValue {
                            shop_id,
                            shop_name: "Main".into(),
                            amount: level.amount,
                            small_left: 2.0,
                            ..Default::default()
                        },
                    })
                    .collect())
            });
        deps.index
            .expect_upsert_measurement_values()
            .withf(|_, values| values.len() == 1 && values[0].value.shop_name == "Main" && values[0].value.small_left == 2.0)
            .times(1)
            .returning(|_, _| Ok(()));

        let stored = deps
            .service()
            .upsert_shop_measurement_values(ctx, shop_id, vec![StockLevel { product_id, amount: 7.0 }])
            .await
            .unwrap();
        assert_eq!(stored[0].value.amount, 7.0);
    }

    #[tokio::test]
    async fn test_reindex_rebuilds_or_removes_document() {
        let ctx = ctx();

        let mut deps = TestDeps::default();
        deps.products
            .expect_get_by_id()
            .returning(|ctx, id| Ok(product(ctx.company_id, id, 3, "Milk")));
        deps.index.expect_create().times(1).returning(|_| Ok(()));
        assert!(deps.service().reindex_product(ctx, Uuid::new_v4()).await.unwrap());

        let mut deps = TestDeps::default();
        deps.products
            .expect_get_by_id()
            .returning(|_, id| Err(CatalogError::not_found("product", id)));
        deps.index.expect_delete().times(1).returning(|_, _| Ok(()));
        assert!(!deps.service().reindex_product(ctx, Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_measurement_unit_creation_is_published() {
        let ctx = ctx();

        let mut deps = TestDeps::default();
        deps.references
            .expect_create_measurement_unit()
            .returning(|ctx, _| Ok(measurement_unit(ctx.company_id, Uuid::new_v4())));
        deps.publisher
            .expect_publish()
            .withf(move |topic, payload| {
                topic == MEASUREMENT_UNIT_CREATED && payload["company_id"] == ctx.company_id.to_string()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        deps.service()
            .create_measurement_unit(
                ctx,
                CreateMeasurementUnit {
                    unit_id: Uuid::new_v4(),
                    precision_id: None,
                },
            )
            .await
            .unwrap();
    }
}
