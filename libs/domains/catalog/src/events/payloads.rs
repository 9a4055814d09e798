//! Wire payloads of consumed and published events

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bulk_edit::BulkEditField;
use crate::models::{
    MeasurementUnit, OrderItem, PriceUpdate, ProductCopy, StockLevel, Translations,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopPayload {
    pub id: Uuid,
    #[serde(default)]
    pub company_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyCreated {
    pub id: Uuid,
    pub name: String,
    pub created_by: Option<Uuid>,
    /// Default shop opened with the company
    pub shop: Option<ShopPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierPayload {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub phone_number: String,
}

/// Deletion of a replicated entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDeleted {
    pub id: Uuid,
    pub company_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub id: Uuid,
    pub company_id: Uuid,
    pub shop_id: Uuid,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLevelsUpserted {
    pub company_id: Uuid,
    #[serde(default)]
    pub user_id: Uuid,
    pub shop_id: Uuid,
    #[serde(default)]
    pub products_values: Vec<StockLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopPricesUpserted {
    pub company_id: Uuid,
    #[serde(default)]
    pub user_id: Uuid,
    pub shop_id: Uuid,
    #[serde(default)]
    pub products_values: Vec<PriceUpdate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductsImported {
    pub company_id: Uuid,
    #[serde(default)]
    pub user_id: Uuid,
    pub products: Vec<ProductCopy>,
}

/// Published after an import so the order service gets the same products
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductsForOrderService {
    pub company_id: Uuid,
    pub products: Vec<ProductCopy>,
}

/// A company's measurement unit as other services copy it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementUnitCopy {
    pub id: Uuid,
    pub company_id: Uuid,
    pub short_name: String,
    pub long_name: String,
    pub precision: String,
    pub is_deletable: bool,
    pub short_name_translation: Translations,
    pub long_name_translation: Translations,
    pub created_by: Option<Uuid>,
}

impl From<&MeasurementUnit> for MeasurementUnitCopy {
    fn from(unit: &MeasurementUnit) -> Self {
        Self {
            id: unit.id,
            company_id: unit.company_id,
            short_name: unit.short_name.clone(),
            long_name: unit.long_name.clone(),
            precision: unit.precision.as_ref().map(|p| p.value.clone()).unwrap_or_default(),
            is_deletable: unit.is_deletable,
            short_name_translation: unit.short_name_translation.clone(),
            long_name_translation: unit.long_name_translation.clone(),
            created_by: unit.created_by,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductsBulkUpdated {
    pub company_id: Uuid,
    pub product_ids: Vec<Uuid>,
    pub field: BulkEditField,
    pub value: String,
    pub shop_ids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_company_without_shop_decodes() {
        let id = Uuid::new_v4();
        let company: CompanyCreated = serde_json::from_value(json!({
            "id": id,
            "name": "Acme",
            "created_by": null,
            "shop": null
        }))
        .unwrap();
        assert_eq!(company.id, id);
        assert!(company.shop.is_none());
    }

    #[test]
    fn test_price_upsert_wire_shape() {
        let product_id = Uuid::new_v4();
        let payload: ShopPricesUpserted = serde_json::from_value(json!({
            "company_id": Uuid::new_v4(),
            "shop_id": Uuid::new_v4(),
            "products_values": [
                { "product_id": product_id, "price": { "retail_price": 10.0, "supply_price": 7.5 } }
            ]
        }))
        .unwrap();

        assert!(payload.user_id.is_nil());
        assert_eq!(payload.products_values[0].product_id, product_id);
        assert_eq!(payload.products_values[0].price.supply_price, 7.5);
    }
}
