//! Writes replicated from other services. Every use case is safe to replay.

use tracing::{debug, info, instrument, warn};

use super::payloads::{
    CompanyCreated, EntityDeleted, MeasurementUnitCopy, OrderCreated, ProductsForOrderService, ProductsImported,
    ShopPayload, ShopPricesUpserted, StockLevelsUpserted, SupplierPayload,
};
use super::topics::{MEASUREMENT_UNIT_CREATED, PRODUCTS_FOR_ORDER_SERVICE};
use crate::error::{CatalogError, CatalogResult};
use crate::models::{Company, ProductDocument, RequestContext, Shop, Supplier};
use crate::service::CatalogService;
use uuid::Uuid;

impl CatalogService {
    /// Store the company with its default shop, then announce the company's
    /// measurement units one event each
    #[instrument(skip(self, event), fields(company_id = %event.id))]
    pub async fn replicate_company(&self, event: CompanyCreated) -> CatalogResult<usize> {
        let shop = event
            .shop
            .ok_or_else(|| CatalogError::Validation(format!("company {} has no shop", event.id)))?;

        let units = self
            .tenants
            .provision_company(
                Company {
                    id: event.id,
                    name: event.name,
                    created_by: event.created_by,
                },
                Shop {
                    id: shop.id,
                    company_id: event.id,
                    name: shop.name,
                },
            )
            .await?;

        for unit in &units {
            self.publish(MEASUREMENT_UNIT_CREATED, &MeasurementUnitCopy::from(unit))
                .await?;
        }

        info!(units = units.len(), "Company replicated");
        Ok(units.len())
    }

    #[instrument(skip(self, event), fields(company_id = %event.company_id, shop_id = %event.id))]
    pub async fn replicate_shop(&self, event: ShopPayload) -> CatalogResult<()> {
        self.tenants
            .upsert_shop(Shop {
                id: event.id,
                company_id: event.company_id,
                name: event.name,
            })
            .await
    }

    #[instrument(skip(self), fields(company_id = %event.company_id, shop_id = %event.id))]
    pub async fn remove_shop(&self, event: EntityDeleted) -> CatalogResult<()> {
        if !self.tenants.delete_shop(event.company_id, event.id).await? {
            debug!("Shop already deleted");
        }
        Ok(())
    }

    #[instrument(skip(self, event), fields(company_id = %event.company_id, supplier_id = %event.id))]
    pub async fn replicate_supplier(&self, event: SupplierPayload) -> CatalogResult<()> {
        self.tenants
            .upsert_supplier(Supplier {
                id: event.id,
                company_id: event.company_id,
                name: event.name,
                phone_number: event.phone_number,
            })
            .await
    }

    #[instrument(skip(self), fields(company_id = %event.company_id, supplier_id = %event.id))]
    pub async fn remove_supplier(&self, event: EntityDeleted) -> CatalogResult<()> {
        if !self.tenants.delete_supplier(event.company_id, event.id).await? {
            debug!("Supplier already deleted");
        }
        Ok(())
    }

    /// Subtract sold quantities in the order's shop, once per order, and
    /// mirror the resulting stock rows into the index. Items without a local
    /// stock row are skipped.
    #[instrument(skip(self, event), fields(company_id = %event.company_id, order_id = %event.id))]
    pub async fn apply_order(&self, event: OrderCreated) -> CatalogResult<()> {
        if event.items.is_empty() {
            return Ok(());
        }

        let applied = self
            .products
            .decrement_stock(event.company_id, event.id, event.shop_id, event.items)
            .await?;
        if applied.replayed {
            debug!("Order already applied, mirroring current stock only");
        }
        for product_id in &applied.missing {
            warn!(shop_id = %event.shop_id, product_id = %product_id, "Order item without stock in shop, skipped");
        }
        if applied.stored.is_empty() {
            return Ok(());
        }

        self.index
            .upsert_measurement_values(event.company_id, applied.stored)
            .await
    }

    #[instrument(skip(self, event), fields(company_id = %event.company_id, shop_id = %event.shop_id))]
    pub async fn apply_stock_levels(&self, event: StockLevelsUpserted) -> CatalogResult<()> {
        if event.products_values.is_empty() {
            return Ok(());
        }

        let ctx = RequestContext::new(event.company_id, event.user_id);
        let requested: Vec<Uuid> = event.products_values.iter().map(|level| level.product_id).collect();
        let stored = match self
            .products
            .upsert_measurement_values(ctx, event.shop_id, event.products_values)
            .await
        {
            Ok(stored) => stored,
            Err(CatalogError::NotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        for product_id in requested.iter().filter(|id| !stored.iter().any(|row| row.product_id == **id)) {
            warn!(product_id = %product_id, "No local product for stock level, skipped");
        }
        if stored.is_empty() {
            return Ok(());
        }

        self.index.upsert_measurement_values(event.company_id, stored).await
    }

    #[instrument(skip(self, event), fields(company_id = %event.company_id, shop_id = %event.shop_id))]
    pub async fn apply_shop_prices(&self, event: ShopPricesUpserted) -> CatalogResult<()> {
        if event.products_values.is_empty() {
            return Ok(());
        }

        let ctx = RequestContext::new(event.company_id, event.user_id);
        let stored = match self
            .products
            .upsert_shop_prices(ctx, event.shop_id, event.products_values)
            .await
        {
            Ok(stored) => stored,
            Err(CatalogError::NotFound { .. }) => {
                warn!("No local products for shop prices");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.index.upsert_shop_prices(event.company_id, stored).await
    }

    /// Copy imported products into both stores, then hand them to the order
    /// service
    #[instrument(skip(self, event), fields(company_id = %event.company_id, count = event.products.len()))]
    pub async fn import_products(&self, event: ProductsImported) -> CatalogResult<()> {
        if event.products.is_empty() {
            return Ok(());
        }

        let mut products = event.products;
        for product in &mut products {
            product.company_id = event.company_id;
        }
        self.products.insert_many(products.clone()).await?;

        let ctx = RequestContext::new(event.company_id, event.user_id);
        let mut documents = Vec::with_capacity(products.len());
        for copy in &products {
            let product = self.products.get_by_id(ctx, copy.id).await?;
            documents.push(ProductDocument::from(&product));
        }
        self.index.insert_many(documents).await?;

        self.publish(
            PRODUCTS_FOR_ORDER_SERVICE,
            &ProductsForOrderService {
                company_id: event.company_id,
                products,
            },
        )
        .await?;

        info!("Products imported");
        Ok(())
    }
}
