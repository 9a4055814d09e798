use strum::{AsRefStr, EnumIter, IntoEnumIterator, IntoStaticStr};

pub const PRODUCT_CREATED: &str = "v1.catalog_service.product.created.success";
pub const PRODUCTS_BULK_UPDATED: &str = "v1.catalog_service.product.bulk_updated.success";
pub const MEASUREMENT_UNIT_CREATED: &str = "v1.catalog_service.measurement_unit.created.success";
pub const PRODUCTS_FOR_ORDER_SERVICE: &str = "v1.inventory_service.create_multiple_products_on_order_service";

/// Topics the catalog replicates from other services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ConsumedTopic {
    CompanyCreated,
    ShopCreated,
    ShopDeleted,
    SupplierCreated,
    SupplierDeleted,
    OrderCreated,
    StockLevelsUpserted,
    ShopPricesUpserted,
    ProductsImported,
}

impl ConsumedTopic {
    pub fn all() -> impl Iterator<Item = ConsumedTopic> {
        ConsumedTopic::iter()
    }

    /// Stream name on the bus
    pub fn topic(&self) -> &'static str {
        match self {
            ConsumedTopic::CompanyCreated => "v1.company_service.company.created.success",
            ConsumedTopic::ShopCreated => "v1.company_service.shop.created.success",
            ConsumedTopic::ShopDeleted => "v1.company_service.shop.deleted.success",
            ConsumedTopic::SupplierCreated => "v1.inventory_service.supplier.created.success",
            ConsumedTopic::SupplierDeleted => "v1.inventory_service.supplier.deleted.success",
            ConsumedTopic::OrderCreated => "v1.order_service.order.created.success",
            ConsumedTopic::StockLevelsUpserted => "v1.inventory_service.supplier_order.measurement_values.upserted",
            ConsumedTopic::ShopPricesUpserted => "v1.inventory_service.shop_price.upserted",
            ConsumedTopic::ProductsImported => "v1.inventory_service.products.imported",
        }
    }

    /// Handler name used in logs and metrics
    pub fn handler_name(&self) -> &'static str {
        self.into()
    }

    pub fn from_topic(topic: &str) -> Option<ConsumedTopic> {
        ConsumedTopic::iter().find(|t| t.topic() == topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_topics_are_distinct_and_resolvable() {
        let topics: HashSet<&str> = ConsumedTopic::all().map(|t| t.topic()).collect();
        assert_eq!(topics.len(), ConsumedTopic::all().count());

        for topic in ConsumedTopic::all() {
            assert_eq!(ConsumedTopic::from_topic(topic.topic()), Some(topic));
        }
        assert_eq!(ConsumedTopic::from_topic(PRODUCT_CREATED), None);
    }

    #[test]
    fn test_handler_names() {
        assert_eq!(ConsumedTopic::StockLevelsUpserted.as_ref(), "stock_levels_upserted");
        assert_eq!(ConsumedTopic::CompanyCreated.handler_name(), "company_created");
    }
}
