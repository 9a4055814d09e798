use event_bus::BusError;
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors of the catalog domain.
///
/// Callers only need to tell "retry" from "correct the request":
/// [`CatalogError::is_retryable`] draws that line.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Zero rows for an id within the caller's tenant. Deliberately silent
    /// about whether the id exists under another tenant.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Filter not found: {0}")]
    FilterNotFound(String),

    #[error("{operation} failed for {entity}: {source}")]
    Dependency {
        operation: &'static str,
        entity: String,
        #[source]
        source: BoxError,
    },

    #[error("Batch affected {affected} of {requested} rows")]
    PartialBatch { requested: usize, affected: u64 },

    #[error("Database error: {0}")]
    Database(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

impl CatalogError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CatalogError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn dependency(
        operation: &'static str,
        entity: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        CatalogError::Dependency {
            operation,
            entity: entity.into(),
            source: source.into(),
        }
    }

    /// True for failures a retry of the same request may fix
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::Dependency { .. } | CatalogError::PartialBatch { .. } | CatalogError::Database(_)
        )
    }
}

impl From<DbErr> for CatalogError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => CatalogError::Conflict(detail),
            Some(SqlErr::ForeignKeyConstraintViolation(detail)) => CatalogError::Validation(detail),
            _ => CatalogError::Database(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for CatalogError {
    fn from(err: validator::ValidationErrors) -> Self {
        CatalogError::Validation(err.to_string())
    }
}

/// Replication handlers report domain errors to the bus, which decides
/// between redelivery and the DLQ from the category.
impl From<CatalogError> for BusError {
    fn from(err: CatalogError) -> Self {
        if err.is_retryable() {
            BusError::transient(err.to_string())
        } else {
            BusError::permanent(err.to_string())
        }
    }
}
