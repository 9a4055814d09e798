use async_trait::async_trait;
use event_bus::{BusError, DomainEvent, EventHandler};
use std::sync::Arc;
use tracing::debug;

use super::topics::ConsumedTopic;
use crate::service::CatalogService;

/// Bus handler of one consumed topic.
///
/// Payloads that do not decode are permanent failures. Domain errors are
/// mapped by [`CatalogError::is_retryable`](crate::CatalogError::is_retryable).
#[derive(Clone)]
pub struct CatalogEventHandler {
    topic: ConsumedTopic,
    service: Arc<CatalogService>,
}

impl CatalogEventHandler {
    pub fn new(topic: ConsumedTopic, service: Arc<CatalogService>) -> Self {
        Self { topic, service }
    }

    pub fn topic(&self) -> ConsumedTopic {
        self.topic
    }
}

#[async_trait]
impl EventHandler for CatalogEventHandler {
    async fn handle(&self, event: &DomainEvent) -> Result<(), BusError> {
        debug!(event_id = %event.id, source = %event.source, handler = self.name(), "Handling event");

        let service = &self.service;
        match self.topic {
            ConsumedTopic::CompanyCreated => {
                service.replicate_company(event.decode()?).await?;
            }
            ConsumedTopic::ShopCreated => service.replicate_shop(event.decode()?).await?,
            ConsumedTopic::ShopDeleted => service.remove_shop(event.decode()?).await?,
            ConsumedTopic::SupplierCreated => service.replicate_supplier(event.decode()?).await?,
            ConsumedTopic::SupplierDeleted => service.remove_supplier(event.decode()?).await?,
            ConsumedTopic::OrderCreated => service.apply_order(event.decode()?).await?,
            ConsumedTopic::StockLevelsUpserted => service.apply_stock_levels(event.decode()?).await?,
            ConsumedTopic::ShopPricesUpserted => service.apply_shop_prices(event.decode()?).await?,
            ConsumedTopic::ProductsImported => service.import_products(event.decode()?).await?,
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.topic.handler_name()
    }
}
