//! Elasticsearch projection of the product store

mod client;
mod filters;
mod mapping;
mod query;
mod scripts;

pub use client::EsProductIndex;
pub use filters::FilterKey;
pub use query::escape_query_string;

/// Single index holding every tenant's products, isolated by `company_id`
pub const PRODUCT_INDEX: &str = "products";
