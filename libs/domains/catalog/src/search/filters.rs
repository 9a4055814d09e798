use serde_json::{Value, json};
use std::str::FromStr;
use strum::{AsRefStr, EnumIter, EnumString};

use crate::error::{CatalogError, CatalogResult};
use crate::models::Filter;

/// Keys accepted by the listing filter registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum FilterKey {
    /// Products in the category or any of its children
    Category,
    MeasurementUnit,
    ProductIds,
}

impl FilterKey {
    fn clause(&self, values: &[&str]) -> Value {
        match self {
            FilterKey::Category => json!({
                "bool": {
                    "should": [
                        { "terms": { "categories.parent_id.keyword": values } },
                        { "terms": { "categories.id.keyword": values } }
                    ]
                }
            }),
            FilterKey::MeasurementUnit => json!({ "terms": { "measurement_unit.id.keyword": values } }),
            FilterKey::ProductIds => json!({ "terms": { "id.keyword": values } }),
        }
    }
}

/// Query clause of a filter, or [`CatalogError::FilterNotFound`] for an
/// unknown key
pub(crate) fn filter_clause(filter: &Filter) -> CatalogResult<Value> {
    let key = FilterKey::from_str(&filter.key).map_err(|_| CatalogError::FilterNotFound(filter.key.clone()))?;
    let values: Vec<&str> = filter
        .value
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect();

    Ok(key.clause(&values))
}
