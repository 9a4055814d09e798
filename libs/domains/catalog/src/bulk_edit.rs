//! One field-level change applied to many products in both stores

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumString};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{CatalogError, CatalogResult};
use crate::events::ProductsBulkUpdated;
use crate::events::topics::PRODUCTS_BULK_UPDATED;
use crate::models::{ProductPatch, RequestContext, ShortCategory, ShortMeasurementUnit};
use crate::service::CatalogService;

/// Field a bulk edit rewrites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BulkEditField {
    Name,
    /// Measurement unit of the current detail
    MeasurementValue,
    Category,
    LowStock,
}

/// Parsed change, carrying a typed value per field
#[derive(Debug, Clone, PartialEq)]
pub enum BulkChange {
    Name(String),
    MeasurementUnit(Uuid),
    /// Link the current details to this category
    Category(Uuid),
    LowStock { small_left: f64, shop_ids: Vec<Uuid> },
}

impl BulkChange {
    pub fn field(&self) -> BulkEditField {
        match self {
            BulkChange::Name(_) => BulkEditField::Name,
            BulkChange::MeasurementUnit(_) => BulkEditField::MeasurementValue,
            BulkChange::Category(_) => BulkEditField::Category,
            BulkChange::LowStock { .. } => BulkEditField::LowStock,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkEditRequest {
    pub product_ids: Vec<Uuid>,
    #[serde(default)]
    pub shop_ids: Vec<Uuid>,
    pub field: BulkEditField,
    /// Raw value, interpreted per field
    pub value: String,
}

impl BulkEditRequest {
    pub fn change(&self) -> CatalogResult<BulkChange> {
        if self.product_ids.is_empty() {
            return Err(CatalogError::Validation("no products selected".to_string()));
        }

        let value = self.value.trim();
        let uuid = |what: &str| {
            Uuid::parse_str(value).map_err(|_| CatalogError::Validation(format!("invalid {} id: {:?}", what, value)))
        };

        match self.field {
            BulkEditField::Name if value.is_empty() => Err(CatalogError::Validation("name is empty".to_string())),
            BulkEditField::Name => Ok(BulkChange::Name(value.to_string())),
            BulkEditField::MeasurementValue => uuid("measurement unit").map(BulkChange::MeasurementUnit),
            BulkEditField::Category => uuid("category").map(BulkChange::Category),
            BulkEditField::LowStock => {
                if self.shop_ids.is_empty() {
                    return Err(CatalogError::Validation("low_stock needs at least one shop".to_string()));
                }
                let small_left = value
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .ok_or_else(|| CatalogError::Validation(format!("invalid low_stock value: {:?}", value)))?;
                Ok(BulkChange::LowStock {
                    small_left,
                    shop_ids: self.shop_ids.clone(),
                })
            }
        }
    }
}

impl CatalogService {
    /// Partial document every selected product receives in the index
    async fn bulk_patch(&self, ctx: RequestContext, change: &BulkChange) -> CatalogResult<ProductPatch> {
        let patch = match change {
            BulkChange::Name(name) => ProductPatch {
                name: Some(name.clone()),
                ..Default::default()
            },
            BulkChange::MeasurementUnit(id) => {
                let unit = self.references.get_measurement_unit(ctx.company_id, *id).await?;
                ProductPatch {
                    measurement_unit: Some(ShortMeasurementUnit::from(&unit)),
                    ..Default::default()
                }
            }
            BulkChange::Category(id) => {
                let category = self.references.get_category(ctx.company_id, *id).await?;
                ProductPatch {
                    categories: vec![ShortCategory::from(&category)],
                    ..Default::default()
                }
            }
            BulkChange::LowStock { small_left, .. } => ProductPatch {
                low_stock: Some(*small_left),
                ..Default::default()
            },
        };
        Ok(patch)
    }

    /// Apply one change to every selected product: relational commit, then
    /// the bulk-updated event, then the scripted index update.
    ///
    /// Returns the number of relational rows touched.
    #[instrument(skip(self, request), fields(company_id = %ctx.company_id, field = %request.field, count = request.product_ids.len()))]
    pub async fn bulk_edit_products(&self, ctx: RequestContext, request: BulkEditRequest) -> CatalogResult<u64> {
        let change = request.change()?;
        let patch = self.bulk_patch(ctx, &change).await?;

        let affected = self
            .products
            .bulk_edit(ctx, request.product_ids.clone(), change)
            .await?;

        self.publish(
            PRODUCTS_BULK_UPDATED,
            &ProductsBulkUpdated {
                company_id: ctx.company_id,
                product_ids: request.product_ids.clone(),
                field: request.field,
                value: request.value.clone(),
                shop_ids: request.shop_ids.clone(),
            },
        )
        .await?;

        let patches: BTreeMap<Uuid, ProductPatch> = request
            .product_ids
            .iter()
            .map(|id| (*id, patch.clone()))
            .collect();
        self.index
            .bulk_update(ctx.company_id, request.field, patches, request.shop_ids)
            .await?;

        info!(affected, "Products bulk edited");
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::TestDeps;
    use mockall::Sequence;
    use std::str::FromStr;

    fn request(field: BulkEditField, value: &str, shop_ids: Vec<Uuid>) -> BulkEditRequest {
        BulkEditRequest {
            product_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            shop_ids,
            field,
            value: value.to_string(),
        }
    }

    #[test]
    fn test_field_names() {
        assert_eq!(BulkEditField::MeasurementValue.as_ref(), "measurement_value");
        assert_eq!(BulkEditField::from_str("low_stock").unwrap(), BulkEditField::LowStock);
        assert_eq!(serde_json::to_value(BulkEditField::Category).unwrap(), "category");
    }

    #[test]
    fn test_change_parsing() {
        let shop = Uuid::new_v4();
        assert_eq!(
            request(BulkEditField::LowStock, " 5 ", vec![shop]).change().unwrap(),
            BulkChange::LowStock {
                small_left: 5.0,
                shop_ids: vec![shop]
            }
        );
        assert_eq!(
            request(BulkEditField::Name, "Milk", vec![]).change().unwrap().field(),
            BulkEditField::Name
        );

        let invalid = [
            request(BulkEditField::Name, "  ", vec![]),
            request(BulkEditField::Category, "not-a-uuid", vec![]),
            request(BulkEditField::LowStock, "5", vec![]),
            request(BulkEditField::LowStock, "-1", vec![shop]),
            BulkEditRequest {
                product_ids: vec![],
                ..request(BulkEditField::Name, "Milk", vec![])
            },
        ];
        for request in invalid {
            assert!(
                matches!(request.change(), Err(CatalogError::Validation(_))),
                "{:?} should be rejected",
                request
            );
        }
    }

    #[tokio::test]
    async fn test_low_stock_reaches_both_stores() {
        let ctx = RequestContext::new(Uuid::new_v4(), Uuid::new_v4());
        let shop = Uuid::new_v4();
        let request = request(BulkEditField::LowStock, "5", vec![shop]);
        let ids = request.product_ids.clone();

        let mut deps = TestDeps::default();
        let mut seq = Sequence::new();

        let expected_ids = ids.clone();
        deps.products
            .expect_bulk_edit()
            .withf(move |_, product_ids, change| {
                product_ids == &expected_ids
                    && change
                        == &BulkChange::LowStock {
                            small_left: 5.0,
                            shop_ids: vec![shop],
                        }
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(2));
        deps.publisher
            .expect_publish()
            .withf(|topic, payload| topic == PRODUCTS_BULK_UPDATED && payload["field"] == "low_stock")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let company_id = ctx.company_id;
        deps.index
            .expect_bulk_update()
            .withf(move |company, field, patches, shop_ids| {
                *company == company_id
                    && *field == BulkEditField::LowStock
                    && shop_ids == &vec![shop]
                    && patches.len() == 2
                    && patches.values().all(|p| p.low_stock == Some(5.0))
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(()));

        let affected = deps.service().bulk_edit_products(ctx, request).await.unwrap();
        assert_eq!(affected, 2);
    }

    #[tokio::test]
    async fn test_unknown_category_stops_before_any_write() {
        let ctx = RequestContext::new(Uuid::new_v4(), Uuid::new_v4());
        let category = Uuid::new_v4();

        let mut deps = TestDeps::default();
        deps.references
            .expect_get_category()
            .returning(|_, id| Err(CatalogError::not_found("category", id)));
        deps.products.expect_bulk_edit().times(0);
        deps.index.expect_bulk_update().times(0);

        let result = deps
            .service()
            .bulk_edit_products(ctx, request(BulkEditField::Category, &category.to_string(), vec![]))
            .await;
        assert!(matches!(result, Err(CatalogError::NotFound { entity: "category", .. })));
    }

    #[tokio::test]
    async fn test_zero_matches_skips_event_and_index() {
        let ctx = RequestContext::new(Uuid::new_v4(), Uuid::new_v4());

        let mut deps = TestDeps::default();
        deps.products
            .expect_bulk_edit()
            .returning(|_, _, _| Err(CatalogError::not_found("product", "2 selected")));
        deps.publisher.expect_publish().times(0);
        deps.index.expect_bulk_update().times(0);

        let result = deps
            .service()
            .bulk_edit_products(ctx, request(BulkEditField::Name, "Kefir", vec![]))
            .await;
        assert!(matches!(result, Err(CatalogError::NotFound { .. })));
    }
}
