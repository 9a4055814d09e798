//! HTTP connection to the Elasticsearch cluster holding the product index

mod config;
mod connector;

pub use config::ElasticConfig;
pub use connector::{ElasticConnection, connect, connect_with_retry};
