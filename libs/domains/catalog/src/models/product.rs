use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{ShortCategory, ShortMeasurementUnit, ShortSupplier, ShortVat};

pub const DEFAULT_PRODUCT_TYPE: &str = "single";

fn default_product_type() -> String {
    DEFAULT_PRODUCT_TYPE.to_string()
}

/// Stock of one product in one shop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopMeasurementValue {
    pub shop_id: Uuid,
    pub shop_name: String,
    pub is_available: bool,
    pub has_trigger: bool,
    pub amount: f64,
    pub small_left: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopPrice {
    pub shop_id: Uuid,
    pub shop_name: String,
    pub min_price: f64,
    pub max_price: f64,
    pub supply_price: f64,
    pub retail_price: f64,
    pub whole_sale_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductImage {
    pub file_name: String,
    #[serde(default)]
    pub sequence_number: i32,
}

/// Mutable product fields; one write creates one detail version
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ProductInput {
    #[serde(default = "default_product_type")]
    #[validate(length(min = 1, max = 64))]
    pub product_type_id: String,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    #[validate(length(max = 128))]
    pub sku: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 64))]
    pub mxik_code: String,
    #[serde(default)]
    pub is_marking: bool,
    pub brand_id: Option<Uuid>,
    #[serde(default)]
    pub description: String,
    pub measurement_unit_id: Uuid,
    pub supplier_id: Uuid,
    pub vat_id: Uuid,
    #[serde(default)]
    pub barcodes: Vec<String>,
    #[serde(default)]
    pub images: Vec<ProductImage>,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    #[serde(default)]
    pub measurement_values: Vec<ShopMeasurementValue>,
    #[serde(default)]
    pub shop_prices: Vec<ShopPrice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedProduct {
    pub product_id: Uuid,
    pub product_detail_id: Uuid,
}

/// Current state of a product: identity joined with its current detail
/// version and resolved references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub company_id: Uuid,
    pub product_type_id: String,
    pub parent_id: Option<Uuid>,
    pub current_version: i32,
    pub detail_id: Uuid,
    pub sku: String,
    pub name: String,
    pub mxik_code: String,
    pub is_marking: bool,
    pub brand_id: Option<Uuid>,
    pub description: String,
    pub measurement_unit: Option<ShortMeasurementUnit>,
    pub supplier: Option<ShortSupplier>,
    pub vat: Option<ShortVat>,
    pub barcodes: Vec<String>,
    pub images: Vec<ProductImage>,
    pub categories: Vec<ShortCategory>,
    pub tag_ids: Vec<Uuid>,
    pub measurement_values: Vec<ShopMeasurementValue>,
    pub shop_prices: Vec<ShopPrice>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    /// Creation time of the current detail version
    pub updated_at: NaiveDateTime,
}

impl Product {
    /// File name of the lowest-sequence image
    pub fn main_image(&self) -> Option<&str> {
        self.images
            .iter()
            .min_by_key(|image| image.sequence_number)
            .map(|image| image.file_name.as_str())
    }
}

/// Stock and prices of one shop as carried by product replication events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopValueCopy {
    pub shop_id: Uuid,
    pub is_available: bool,
    pub in_stock: f64,
    pub supply_price: f64,
    pub retail_price: f64,
    pub whole_sale_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// Product as replicated between services: created here on
/// `product.created.success`, consumed from `products.imported`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCopy {
    pub id: Uuid,
    pub company_id: Uuid,
    pub created_by: Option<Uuid>,
    #[serde(default = "default_product_type")]
    pub product_type_id: String,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub mxik_code: String,
    #[serde(default)]
    pub is_marking: bool,
    pub brand_id: Option<Uuid>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    pub measurement_unit_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub vat_id: Option<Uuid>,
    #[serde(default)]
    pub barcodes: Vec<String>,
    #[serde(default)]
    pub shop_measurement_values: Vec<ShopValueCopy>,
}

impl From<&Product> for ProductCopy {
    fn from(product: &Product) -> Self {
        let shop_measurement_values = product
            .measurement_values
            .iter()
            .map(|value| {
                let price = product
                    .shop_prices
                    .iter()
                    .find(|price| price.shop_id == value.shop_id)
                    .cloned()
                    .unwrap_or_default();
                ShopValueCopy {
                    shop_id: value.shop_id,
                    is_available: value.is_available,
                    in_stock: value.amount,
                    supply_price: price.supply_price,
                    retail_price: price.retail_price,
                    whole_sale_price: price.whole_sale_price,
                    min_price: price.min_price,
                    max_price: price.max_price,
                }
            })
            .collect();

        Self {
            id: product.id,
            company_id: product.company_id,
            created_by: product.created_by,
            product_type_id: product.product_type_id.clone(),
            parent_id: product.parent_id,
            sku: product.sku.clone(),
            name: product.name.clone(),
            mxik_code: product.mxik_code.clone(),
            is_marking: product.is_marking,
            brand_id: product.brand_id,
            description: product.description.clone(),
            image: product.main_image().unwrap_or_default().to_string(),
            measurement_unit_id: product.measurement_unit.as_ref().map(|mu| mu.id).unwrap_or_default(),
            supplier_id: product.supplier.as_ref().map(|s| s.id),
            vat_id: product.vat.as_ref().map(|v| v.id),
            barcodes: product.barcodes.clone(),
            shop_measurement_values,
        }
    }
}

/// New stock amount for one product
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: Uuid,
    pub amount: f64,
}

/// Stock row of one product in one shop, as stored after an upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockUpdate {
    pub product_id: Uuid,
    pub value: ShopMeasurementValue,
}

/// Prices of one product; `price.shop_id` is overridden by the target shop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub product_id: Uuid,
    pub price: ShopPrice,
}

/// Quantity sold of one product
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub value: f64,
}

/// Stock of an order's products in its shop after the order was applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockDecrement {
    pub stored: Vec<StockUpdate>,
    /// Ordered products with no stock row in the shop
    pub missing: Vec<Uuid>,
    /// The order was applied by an earlier delivery; nothing was subtracted
    pub replayed: bool,
}
