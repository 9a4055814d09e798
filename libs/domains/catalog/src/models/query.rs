use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::{Page, ProductDocument};

/// How a filter value relates to the field. `Equal`, `GreaterThan` and
/// `Include` select matching products, the rest exclude them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilterRelation {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    Include,
    Exclude,
}

impl FilterRelation {
    pub fn is_positive(&self) -> bool {
        matches!(self, FilterRelation::Equal | FilterRelation::GreaterThan | FilterRelation::Include)
    }
}

/// One registry filter; `value` may hold several comma-separated ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    pub relation: FilterRelation,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

/// Listing request against the search index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductQuery {
    pub page: Page,
    pub search: Option<String>,
    pub category_ids: Vec<Uuid>,
    pub measurement_unit_ids: Vec<Uuid>,
    pub product_ids: Vec<Uuid>,
    pub filters: Vec<Filter>,
    pub sort: Option<Sort>,
    /// Adds the retail and supply stock valuations to the page
    pub with_totals: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPage {
    pub items: Vec<ProductDocument>,
    pub total: u64,
    pub total_retail_price: Option<f64>,
    pub total_supply_price: Option<f64>,
}
