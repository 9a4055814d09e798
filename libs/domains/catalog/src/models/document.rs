use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{
    Category, DATE_TIME_FORMAT, MeasurementUnit, Product, ProductImage, ShopMeasurementValue, ShopPrice,
    Translations, Vat,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortMeasurementUnit {
    pub id: Uuid,
    pub short_name: String,
    pub long_name: String,
    pub precision: String,
    pub short_name_translation: Translations,
    pub long_name_translation: Translations,
}

impl From<&MeasurementUnit> for ShortMeasurementUnit {
    fn from(unit: &MeasurementUnit) -> Self {
        Self {
            id: unit.id,
            short_name: unit.short_name.clone(),
            long_name: unit.long_name.clone(),
            precision: unit.precision.as_ref().map(|p| p.value.clone()).unwrap_or_default(),
            short_name_translation: unit.short_name_translation.clone(),
            long_name_translation: unit.long_name_translation.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortSupplier {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortVat {
    pub id: Uuid,
    pub name: String,
    pub percentage: f64,
}

impl From<&Vat> for ShortVat {
    fn from(vat: &Vat) -> Self {
        Self {
            id: vat.id,
            name: vat.name.clone(),
            percentage: vat.percentage,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortCategory {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
}

impl From<&Category> for ShortCategory {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id,
            name: category.name.clone(),
            parent_id: category.parent_id,
        }
    }
}

/// Denormalized search-index replica of one product, keyed by `id`.
///
/// Per-shop maps are keyed by shop id so scripted updates can write a single
/// shop's slot without touching the others.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductDocument {
    pub id: Uuid,
    pub company_id: Uuid,
    pub product_type_id: String,
    pub parent_id: Option<Uuid>,
    pub sku: String,
    pub name: String,
    pub mxik_code: String,
    pub is_marking: bool,
    pub brand_id: Option<Uuid>,
    pub description: String,
    pub barcodes: Vec<String>,
    pub images: Vec<ProductImage>,
    pub measurement_unit: Option<ShortMeasurementUnit>,
    pub supplier: Option<ShortSupplier>,
    pub vat: Option<ShortVat>,
    pub measurement_values: BTreeMap<Uuid, ShopMeasurementValue>,
    pub shop_prices: BTreeMap<Uuid, ShopPrice>,
    pub categories: Vec<ShortCategory>,
    pub created_by: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Product> for ProductDocument {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            company_id: product.company_id,
            product_type_id: product.product_type_id.clone(),
            parent_id: product.parent_id,
            sku: product.sku.clone(),
            name: product.name.clone(),
            mxik_code: product.mxik_code.clone(),
            is_marking: product.is_marking,
            brand_id: product.brand_id,
            description: product.description.clone(),
            barcodes: product.barcodes.clone(),
            images: product.images.clone(),
            measurement_unit: product.measurement_unit.clone(),
            supplier: product.supplier.clone(),
            vat: product.vat.clone(),
            measurement_values: product
                .measurement_values
                .iter()
                .map(|value| (value.shop_id, value.clone()))
                .collect(),
            shop_prices: product
                .shop_prices
                .iter()
                .map(|price| (price.shop_id, price.clone()))
                .collect(),
            categories: product.categories.clone(),
            created_by: product.created_by,
            created_at: product.created_at.format(DATE_TIME_FORMAT).to_string(),
            updated_at: product.updated_at.format(DATE_TIME_FORMAT).to_string(),
        }
    }
}

/// Fields a bulk edit rewrites in the index, per product
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_unit: Option<ShortMeasurementUnit>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<ShortCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_stock: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_document_keys_shop_maps_and_formats_dates() {
        let shop_id = Uuid::new_v4();
        let at = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(9, 5, 0).unwrap();
        let product = Product {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            product_type_id: "single".into(),
            parent_id: None,
            current_version: 1,
            detail_id: Uuid::new_v4(),
            sku: String::new(),
            name: "Bread".into(),
            mxik_code: String::new(),
            is_marking: false,
            brand_id: None,
            description: String::new(),
            measurement_unit: None,
            supplier: None,
            vat: None,
            barcodes: vec![],
            images: vec![],
            categories: vec![],
            tag_ids: vec![],
            measurement_values: vec![ShopMeasurementValue {
                shop_id,
                shop_name: "Main".into(),
                amount: 3.0,
                ..Default::default()
            }],
            shop_prices: vec![],
            created_by: None,
            created_at: at,
            updated_at: at,
        };

        let document = ProductDocument::from(&product);
        assert_eq!(document.measurement_values[&shop_id].shop_name, "Main");
        assert_eq!(document.updated_at, "2025-03-01 09:05:00");

        let json = serde_json::to_value(&document).unwrap();
        assert_eq!(json["measurement_values"][shop_id.to_string()]["amount"], 3.0);
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = ProductPatch {
            name: Some("Renamed".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Renamed"}));
    }
}
