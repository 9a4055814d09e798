use core_config::{ConfigError, FromEnv, env_or_default, env_required};

pub const DEFAULT_SERVICE_NAME: &str = "catalog_service";
pub const DEFAULT_CONSUMER_GROUP: &str = "invan_catalog_service";

/// Bucket holding product images, exports and rendered labels
pub const FILE_BUCKET: &str = "file";

/// Settings of the catalog domain itself; store connections are configured
/// by the `database` connectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Object storage host, without scheme
    pub minio_endpoint: String,
    /// `source` of published events
    pub service_name: String,
    pub consumer_group: String,
}

impl CatalogConfig {
    pub fn new(minio_endpoint: impl Into<String>) -> Self {
        Self {
            minio_endpoint: minio_endpoint.into(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
        }
    }

    /// Public URL of an object in [`FILE_BUCKET`]
    pub fn file_url(&self, key: &str) -> String {
        format!("https://{}/{}/{}", self.minio_endpoint, FILE_BUCKET, key)
    }
}

/// Environment variables:
/// - `MINIO_ENDPOINT` (required)
/// - `SERVICE_NAME` (default `catalog_service`)
/// - `CONSUMER_GROUP` (default `invan_catalog_service`)
impl FromEnv for CatalogConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            minio_endpoint: env_required("MINIO_ENDPOINT")?,
            service_name: env_or_default("SERVICE_NAME", DEFAULT_SERVICE_NAME),
            consumer_group: env_or_default("CONSUMER_GROUP", DEFAULT_CONSUMER_GROUP),
        })
    }
}
